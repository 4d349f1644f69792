use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::allocation::{
        AggregateShortageLine, AllocationLine, AllocationPreview, AllocationResult,
        OrderShortageSummary,
    },
    ApiResponse, AppState,
};

/// Either explicit `lines` or `auto_fill: true`, never both.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AllocateRequest {
    #[serde(default)]
    pub lines: Option<Vec<AllocationLine>>,
    #[serde(default)]
    pub auto_fill: bool,
    /// Overrides the configured backorder split behavior for this call
    #[serde(default)]
    pub split_backorder: Option<bool>,
}

#[derive(Debug)]
enum AllocationMode {
    Lines(Vec<AllocationLine>),
    AutoFill,
}

impl AllocateRequest {
    fn mode(self) -> Result<(AllocationMode, Option<bool>), ServiceError> {
        match (self.lines, self.auto_fill) {
            (Some(_), true) => Err(ServiceError::ValidationError(
                "send either lines or auto_fill, not both".to_string(),
            )),
            (None, false) => Err(ServiceError::ValidationError(
                "lines are required unless auto_fill is set".to_string(),
            )),
            (Some(lines), false) => Ok((AllocationMode::Lines(lines), self.split_backorder)),
            (None, true) => Ok((AllocationMode::AutoFill, self.split_backorder)),
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/allocation",
    summary = "Preview allocation",
    description = "Per-product ordered, allocated and available quantities with the maximum each line may be set to",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Allocation preview", body = ApiResponse<AllocationPreview>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "Allocation"
)]
pub async fn preview_allocation(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<AllocationPreview>>, ServiceError> {
    let preview = state.services.allocation.preview(order_id).await?;
    Ok(Json(ApiResponse::success(preview)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/allocation",
    summary = "Allocate stock to an order",
    description = "Sets committed quantities per product. Invalid lines are reported in `rejected` without failing the call.",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = AllocateRequest,
    responses(
        (status = 200, description = "Allocation saved", body = ApiResponse<AllocationResult>),
        (status = 400, description = "Malformed request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is not editable", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "Allocation"
)]
pub async fn allocate(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<AllocateRequest>,
) -> Result<Json<ApiResponse<AllocationResult>>, ServiceError> {
    let (mode, split_backorder) = payload.mode()?;
    let result = match mode {
        AllocationMode::Lines(lines) => {
            state
                .services
                .allocation
                .allocate(order_id, lines, split_backorder)
                .await?
        }
        AllocationMode::AutoFill => {
            state
                .services
                .allocation
                .auto_fill(order_id, split_backorder)
                .await?
        }
    };
    Ok(Json(ApiResponse::success(result)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/shortages",
    summary = "Order shortage summary",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Shortage per product", body = ApiResponse<OrderShortageSummary>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "Allocation"
)]
pub async fn order_shortages(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderShortageSummary>>, ServiceError> {
    let summary = state.services.allocation.shortage_summary(order_id).await?;
    Ok(Json(ApiResponse::success(summary)))
}

#[utoipa::path(
    get,
    path = "/api/v1/shortages",
    summary = "Aggregate shortages",
    description = "Open shortage summed per product across orders whose allocation is still editable",
    responses(
        (status = 200, description = "Shortage per product", body = ApiResponse<Vec<AggregateShortageLine>>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "Allocation"
)]
pub async fn aggregate_shortages(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<AggregateShortageLine>>>, ServiceError> {
    let lines = state.services.allocation.aggregate_shortages().await?;
    Ok(Json(ApiResponse::success(lines)))
}
