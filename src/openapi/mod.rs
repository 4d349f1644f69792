use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Allocation Engine API",
        version = "0.1.0",
        description = r#"
# Inventory Allocation & Backorder API

Commits on-hand stock to customer orders, tracks what is still owed, and
escalates shortages discovered at delivery.

## Features

- **Allocation**: preview, explicit or automatic allocation per product
- **Backorders**: residual shortage split into linked child orders
- **Cancellation**: operator cancellation of an outstanding shortfall with a recorded reason
- **Delivery issues**: courier shortage reports with a 24 hour resolution window

## Error Handling

Failures share one payload with a stable `error_code`:

```json
{
  "error": "Conflict",
  "error_code": "illegal_transition",
  "message": "Illegal transition: cannot move order from shipped to canceled (cancellation)",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Stock", description = "Free stock per product"),
        (name = "Allocation", description = "Committing stock to orders and reading shortages"),
        (name = "Backorders", description = "Split-off remainders and their cancellation"),
        (name = "Orders", description = "Order lookup and operator status changes"),
        (name = "Delivery Issues", description = "Shortages found at delivery and their SLA"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        // Stock
        crate::handlers::stock::get_stock,
        crate::handlers::stock::receive_stock,

        // Allocation
        crate::handlers::allocations::preview_allocation,
        crate::handlers::allocations::allocate,
        crate::handlers::allocations::order_shortages,
        crate::handlers::allocations::aggregate_shortages,

        // Backorders
        crate::handlers::backorders::list_backorders,
        crate::handlers::backorders::cancel_backorder,

        // Orders
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,

        // Delivery issues
        crate::handlers::issues::report_issue,
        crate::handlers::issues::current_issue,
        crate::handlers::issues::resolve_issue,
        crate::handlers::issues::overdue_issues,

        // Health
        crate::handlers::health::liveness_check,
        crate::handlers::health::readiness_check,
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::ResponseMeta,
            crate::entities::order::OrderStatus,
            crate::entities::order_issue::IssueType,

            crate::handlers::stock::StockResponse,
            crate::handlers::stock::ReceiveStockRequest,

            crate::handlers::allocations::AllocateRequest,
            crate::services::allocation::AllocationLine,
            crate::services::allocation::RejectionReason,
            crate::services::allocation::RejectedLine,
            crate::services::allocation::AllocatedLine,
            crate::services::allocation::ShortageLine,
            crate::services::allocation::AllocationResult,
            crate::services::allocation::AllocationLineView,
            crate::services::allocation::AllocationPreview,
            crate::services::allocation::OrderShortageSummary,
            crate::services::allocation::AggregateShortageLine,

            crate::services::backorder::BackorderLine,
            crate::services::backorder::BackorderSummary,
            crate::services::backorder::BackorderView,
            crate::handlers::backorders::CancelBackorderRequest,
            crate::services::cancellation::CancellationResult,

            crate::handlers::orders::OrderResponse,
            crate::handlers::orders::TransitionOrderRequest,

            crate::services::delivery_issues::IssueView,
            crate::services::delivery_issues::ReportIssueRequest,
            crate::services::delivery_issues::ResolveIssueRequest,

            crate::handlers::health::HealthResponse,
            crate::handlers::health::ComponentHealth,
            crate::handlers::health::ComponentStatus,
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
