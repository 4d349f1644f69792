use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::{backorder::BackorderView, cancellation::CancellationResult},
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelBackorderRequest {
    /// Audit justification, at least five characters after trimming
    pub reason: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/backorders",
    summary = "List backorders",
    description = "Child orders split from this order, oldest first",
    params(("id" = Uuid, Path, description = "Parent order ID")),
    responses(
        (status = 200, description = "Backorders", body = ApiResponse<Vec<BackorderView>>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "Backorders"
)]
pub async fn list_backorders(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<BackorderView>>>, ServiceError> {
    let views = state.services.backorders.list_backorders(order_id).await?;
    Ok(Json(ApiResponse::success(views)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel-backorder",
    summary = "Cancel backorder",
    description = "Terminates an order's outstanding shortage. Committed stock is not released.",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = CancelBackorderRequest,
    responses(
        (status = 200, description = "Order canceled", body = ApiResponse<CancellationResult>),
        (status = 400, description = "Reason too short", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order cannot be canceled", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "Backorders"
)]
pub async fn cancel_backorder(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<CancelBackorderRequest>,
) -> Result<Json<ApiResponse<CancellationResult>>, ServiceError> {
    let result = state
        .services
        .cancellation
        .cancel_backorder(order_id, &payload.reason)
        .await?;
    Ok(Json(ApiResponse::success(result)))
}
