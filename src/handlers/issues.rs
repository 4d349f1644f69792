use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::delivery_issues::{IssueView, ReportIssueRequest, ResolveIssueRequest},
    ApiResponse, AppState,
};

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/issues",
    summary = "Report delivery shortage",
    description = "Opens a shortage issue on a shipped order, puts the order on hold and starts the 24 hour resolution window",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = ReportIssueRequest,
    responses(
        (status = 201, description = "Issue opened", body = ApiResponse<IssueView>),
        (status = 400, description = "Note too short", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Issue already open or order not shipped", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "Delivery Issues"
)]
pub async fn report_issue(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<ReportIssueRequest>,
) -> Result<(StatusCode, Json<ApiResponse<IssueView>>), ServiceError> {
    let issue = state
        .services
        .delivery_issues
        .report_issue(order_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(issue))))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/issues/current",
    summary = "Current delivery issue",
    description = "The open issue of an order, or its most recent resolved one. `overdue` is computed at read time.",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Issue", body = ApiResponse<IssueView>),
        (status = 404, description = "Order or issue not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "Delivery Issues"
)]
pub async fn current_issue(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<IssueView>>, ServiceError> {
    let issue = state.services.delivery_issues.current_issue(order_id).await?;
    Ok(Json(ApiResponse::success(issue)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/issues/resolve",
    summary = "Resolve delivery issue",
    description = "Closes the open issue, reassigns the order to an active courier and returns it to shipped",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = ResolveIssueRequest,
    responses(
        (status = 200, description = "Issue resolved", body = ApiResponse<IssueView>),
        (status = 400, description = "Resolution note too short", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order, open issue or courier not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is not on hold", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "Delivery Issues"
)]
pub async fn resolve_issue(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<ResolveIssueRequest>,
) -> Result<Json<ApiResponse<IssueView>>, ServiceError> {
    let issue = state
        .services
        .delivery_issues
        .resolve_issue(order_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(issue)))
}

#[utoipa::path(
    get,
    path = "/api/v1/issues/overdue",
    summary = "Overdue delivery issues",
    responses(
        (status = 200, description = "Unresolved issues past their deadline", body = ApiResponse<Vec<IssueView>>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "Delivery Issues"
)]
pub async fn overdue_issues(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<IssueView>>>, ServiceError> {
    let issues = state.services.delivery_issues.list_overdue().await?;
    Ok(Json(ApiResponse::success(issues)))
}
