/*!
 * # Metrics Module
 *
 * Prometheus counters for the allocation engine, exposed in text format at
 * `/metrics`:
 *
 * - allocation calls and rejected lines (by reason)
 * - backorders created / canceled
 * - delivery shortage issues reported / resolved
 * - stock ledger delta failures
 * - lifecycle transitions (by target status)
 */

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to export metrics: {0}")]
    ExportError(String),
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> Response {
        error!(error = %self, "Metrics export failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

lazy_static! {
    pub static ref ALLOCATION_REQUESTS: IntCounter = IntCounter::new(
        "allocation_requests_total",
        "Total number of allocation calls"
    )
    .expect("metric can be created");
    pub static ref ALLOCATION_REJECTED_LINES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "allocation_rejected_lines_total",
            "Allocation lines rejected, by reason"
        ),
        &["reason"]
    )
    .expect("metric can be created");
    pub static ref BACKORDERS_CREATED: IntCounter = IntCounter::new(
        "backorders_created_total",
        "Backorder child orders created by splitting"
    )
    .expect("metric can be created");
    pub static ref BACKORDERS_CANCELED: IntCounter = IntCounter::new(
        "backorders_canceled_total",
        "Orders canceled with an outstanding shortage"
    )
    .expect("metric can be created");
    pub static ref ISSUES_REPORTED: IntCounter = IntCounter::new(
        "delivery_issues_reported_total",
        "Delivery shortage issues reported"
    )
    .expect("metric can be created");
    pub static ref ISSUES_RESOLVED: IntCounter = IntCounter::new(
        "delivery_issues_resolved_total",
        "Delivery shortage issues resolved"
    )
    .expect("metric can be created");
    pub static ref STOCK_DELTA_FAILURES: IntCounter = IntCounter::new(
        "stock_delta_failures_total",
        "Stock ledger deltas refused for insufficient stock"
    )
    .expect("metric can be created");
    pub static ref ORDER_TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "order_transitions_total",
            "Order lifecycle transitions, by target status"
        ),
        &["to"]
    )
    .expect("metric can be created");
    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        registry
            .register(Box::new(ALLOCATION_REQUESTS.clone()))
            .expect("collector can be registered");
        registry
            .register(Box::new(ALLOCATION_REJECTED_LINES.clone()))
            .expect("collector can be registered");
        registry
            .register(Box::new(BACKORDERS_CREATED.clone()))
            .expect("collector can be registered");
        registry
            .register(Box::new(BACKORDERS_CANCELED.clone()))
            .expect("collector can be registered");
        registry
            .register(Box::new(ISSUES_REPORTED.clone()))
            .expect("collector can be registered");
        registry
            .register(Box::new(ISSUES_RESOLVED.clone()))
            .expect("collector can be registered");
        registry
            .register(Box::new(STOCK_DELTA_FAILURES.clone()))
            .expect("collector can be registered");
        registry
            .register(Box::new(ORDER_TRANSITIONS.clone()))
            .expect("collector can be registered");
        registry
    };
}

/// Renders every registered collector in the Prometheus text format.
pub fn export_metrics() -> Result<String, MetricsError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| MetricsError::ExportError(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| MetricsError::ExportError(e.to_string()))
}

// HTTP endpoint handler for metrics
pub async fn metrics_handler() -> Result<Response, MetricsError> {
    let body = export_metrics()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_includes_engine_counters() {
        ALLOCATION_REQUESTS.inc();
        ALLOCATION_REJECTED_LINES
            .with_label_values(&["exceeds_available"])
            .inc();
        let text = export_metrics().unwrap();
        assert!(text.contains("allocation_requests_total"));
        assert!(text.contains("allocation_rejected_lines_total{reason=\"exceeds_available\"}"));
    }
}
