use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{entities::product, ApiResponse, ApiResult, AppState};

/// Free stock of one product.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StockResponse {
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    /// Quantity still free to commit; live allocations are already deducted
    pub available: i32,
    pub min_stock: i32,
    pub below_min_stock: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<product::Model> for StockResponse {
    fn from(model: product::Model) -> Self {
        Self {
            product_id: model.id,
            sku: model.sku,
            name: model.name,
            available: model.on_hand_quantity,
            min_stock: model.min_stock,
            below_min_stock: model.on_hand_quantity < model.min_stock,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReceiveStockRequest {
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[utoipa::path(
    get,
    path = "/api/v1/products/{id}/stock",
    summary = "Get available stock",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Stock retrieved", body = ApiResponse<StockResponse>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "Stock"
)]
pub async fn get_stock(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> ApiResult<StockResponse> {
    let product = state.services.stock.get_stock(product_id).await?;
    Ok(Json(ApiResponse::success(product.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/products/{id}/stock/receipts",
    summary = "Receive stock",
    description = "Adds received units to the product's free stock",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = ReceiveStockRequest,
    responses(
        (status = 200, description = "Stock received", body = ApiResponse<StockResponse>),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "Stock"
)]
pub async fn receive_stock(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<ReceiveStockRequest>,
) -> ApiResult<StockResponse> {
    payload.validate()?;

    let product = state
        .services
        .stock
        .receive_stock(product_id, payload.quantity)
        .await?;
    Ok(Json(ApiResponse::success(product.into())))
}
