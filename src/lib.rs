//! Inventory allocation and backorder engine
//!
//! Commits scarce on-hand stock to competing orders, splits unfilled
//! remainders into backorders, lets operators cancel them with an audit
//! trail, and runs the 24 hour escalation for shortages found at delivery.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod metrics;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

impl AppState {
    /// Wires every service against one connection and event channel.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let services = handlers::AppServices::new(
            db.clone(),
            event_sender.clone(),
            config.auto_split_backorder,
        );
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some("Validation failed".to_string()),
            errors: Some(errors),
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    let stock = Router::new()
        .route("/products/:id/stock", get(handlers::stock::get_stock))
        .route(
            "/products/:id/stock/receipts",
            post(handlers::stock::receive_stock),
        );

    let allocation = Router::new()
        .route(
            "/orders/:id/allocation",
            get(handlers::allocations::preview_allocation).post(handlers::allocations::allocate),
        )
        .route(
            "/orders/:id/shortages",
            get(handlers::allocations::order_shortages),
        )
        .route("/shortages", get(handlers::allocations::aggregate_shortages));

    let backorders = Router::new()
        .route(
            "/orders/:id/backorders",
            get(handlers::backorders::list_backorders),
        )
        .route(
            "/orders/:id/cancel-backorder",
            post(handlers::backorders::cancel_backorder),
        );

    let orders = Router::new()
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/orders/:id/status",
            put(handlers::orders::update_order_status),
        );

    let issues = Router::new()
        .route("/orders/:id/issues", post(handlers::issues::report_issue))
        .route(
            "/orders/:id/issues/current",
            get(handlers::issues::current_issue),
        )
        .route(
            "/orders/:id/issues/resolve",
            post(handlers::issues::resolve_issue),
        )
        .route("/issues/overdue", get(handlers::issues::overdue_issues));

    Router::new()
        .merge(stock)
        .merge(allocation)
        .merge(backorders)
        .merge(orders)
        .merge(issues)
}

/// Full application router: health, metrics, Swagger UI and the v1 API,
/// with request ids and HTTP tracing applied.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .nest("/health", handlers::health::health_routes())
        .route("/metrics", get(metrics::metrics_handler))
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            crate::tracing::request_id_middleware,
        ))
        .with_state(state)
}

pub mod prelude {
    pub use crate::config::AppConfig;
    pub use crate::errors::{ErrorResponse, ServiceError};
    pub use crate::events::{Event, EventSender};
    pub use crate::services::allocation::{AllocationLine, AllocationResult, RejectionReason};
    pub use crate::services::delivery_issues::{ReportIssueRequest, ResolveIssueRequest};
    pub use crate::{ApiResponse, ApiResult, AppState};
}
