mod common;

use assert_matches::assert_matches;
use rstest::rstest;

use allocation_engine::{
    entities::order::OrderStatus, errors::ServiceError, services::allocation::AllocationLine,
};
use common::TestApp;

#[rstest]
#[case::pending(OrderStatus::Pending)]
#[case::waiting_invoice(OrderStatus::WaitingInvoice)]
#[case::partially_fulfilled(OrderStatus::PartiallyFulfilled)]
#[case::debt_pending(OrderStatus::DebtPending)]
#[case::hold(OrderStatus::Hold)]
#[tokio::test]
async fn editable_order_with_shortage_can_be_canceled(#[case] status: OrderStatus) {
    let app = TestApp::new().await;
    let p = app.seed_product("SKU-C", 4, 0).await;
    let order = app.seed_order_with_items(status, &[(p.id, 3)]).await;

    let result = app
        .state
        .services
        .cancellation
        .cancel_backorder(order.id, "  vendor out of stock  ")
        .await
        .expect("cancellation succeeds");

    assert_eq!(result.status, OrderStatus::Canceled);
    assert_eq!(result.cancel_reason, "vendor out of stock");
    assert_eq!(result.abandoned_shortage, 3);

    let stored = app.order(order.id).await;
    assert_eq!(stored.status, OrderStatus::Canceled);
    assert_eq!(stored.cancel_reason.as_deref(), Some("vendor out of stock"));
    assert_eq!(app.on_hand(p.id).await, 4);
}

#[rstest]
#[case::ready_to_ship(OrderStatus::ReadyToShip)]
#[case::shipped(OrderStatus::Shipped)]
#[case::delivered(OrderStatus::Delivered)]
#[case::completed(OrderStatus::Completed)]
#[case::canceled(OrderStatus::Canceled)]
#[tokio::test]
async fn locked_order_cannot_be_canceled(#[case] status: OrderStatus) {
    let app = TestApp::new().await;
    let p = app.seed_product("SKU-C", 0, 0).await;
    let order = app.seed_order_with_items(status, &[(p.id, 3)]).await;

    let err = app
        .state
        .services
        .cancellation
        .cancel_backorder(order.id, "no longer needed")
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::IllegalTransition(_));
    assert_eq!(app.order(order.id).await.status, status);
}

#[tokio::test]
async fn order_without_shortage_cannot_be_canceled() {
    let app = TestApp::new().await;
    let p = app.seed_product("SKU-Z", 5, 0).await;
    let order = app.seed_order_with_items(OrderStatus::Pending, &[(p.id, 5)]).await;
    app.state
        .services
        .allocation
        .allocate(order.id, vec![AllocationLine { product_id: p.id, qty: 5 }], None)
        .await
        .unwrap();

    let err = app
        .state
        .services
        .cancellation
        .cancel_backorder(order.id, "customer changed mind")
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::IllegalTransition(msg) if msg.contains("no outstanding shortage"));
    assert_eq!(app.order(order.id).await.status, OrderStatus::Allocated);
}

#[rstest]
#[case("")]
#[case("    ")]
#[case("late")]
#[case("  abc  ")]
#[tokio::test]
async fn short_reason_is_rejected_before_anything_else(#[case] reason: &str) {
    let app = TestApp::new().await;
    let p = app.seed_product("SKU-R", 0, 0).await;
    let order = app.seed_order_with_items(OrderStatus::Pending, &[(p.id, 2)]).await;

    let err = app
        .state
        .services
        .cancellation
        .cancel_backorder(order.id, reason)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidReason(_));
    assert_eq!(app.order(order.id).await.status, OrderStatus::Pending);

    // Reason is checked before the order is even looked up.
    let missing = app
        .state
        .services
        .cancellation
        .cancel_backorder(uuid::Uuid::new_v4(), reason)
        .await
        .unwrap_err();
    assert_matches!(missing, ServiceError::InvalidReason(_));
}

#[tokio::test]
async fn cancellation_keeps_partial_allocation_committed() {
    let app = TestApp::new().await;
    let p = app.seed_product("SKU-K", 2, 0).await;
    let order = app.seed_order_with_items(OrderStatus::Pending, &[(p.id, 5)]).await;
    app.state
        .services
        .allocation
        .auto_fill(order.id, Some(false))
        .await
        .unwrap();
    assert_eq!(app.on_hand(p.id).await, 0);

    let result = app
        .state
        .services
        .cancellation
        .cancel_backorder(order.id, "supplier discontinued")
        .await
        .unwrap();

    assert_eq!(result.abandoned_shortage, 3);
    assert_eq!(app.on_hand(p.id).await, 0);
    assert_eq!(app.allocated_qty(order.id, p.id).await, 2);
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = TestApp::new().await;
    let err = app
        .state
        .services
        .cancellation
        .cancel_backorder(uuid::Uuid::new_v4(), "valid reason")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
