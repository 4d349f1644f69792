mod common;

use assert_matches::assert_matches;

use allocation_engine::{
    entities::order::OrderStatus,
    errors::ServiceError,
    services::allocation::AllocationLine,
};
use common::TestApp;

#[tokio::test]
async fn available_follows_receipts_and_allocations() {
    let app = TestApp::new().await;
    let p = app.seed_product("SKU-AV", 3, 0).await;
    let order = app.seed_order_with_items(OrderStatus::Pending, &[(p.id, 5)]).await;
    let stock = &app.state.services.stock;

    assert_eq!(stock.get_available(p.id).await.unwrap(), 3);

    let received = stock.receive_stock(p.id, 4).await.unwrap();
    assert_eq!(received.on_hand_quantity, 7);
    assert_eq!(stock.get_available(p.id).await.unwrap(), 7);

    app.state
        .services
        .allocation
        .allocate(order.id, vec![AllocationLine { product_id: p.id, qty: 5 }], None)
        .await
        .unwrap();
    assert_eq!(stock.get_available(p.id).await.unwrap(), 2);

    app.state
        .services
        .allocation
        .allocate(order.id, vec![AllocationLine { product_id: p.id, qty: 1 }], None)
        .await
        .unwrap();
    assert_eq!(stock.get_available(p.id).await.unwrap(), 6);
}

#[tokio::test]
async fn unknown_product_has_no_stock() {
    let app = TestApp::new().await;
    let err = app
        .state
        .services
        .stock
        .get_available(uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[rstest::rstest]
#[case(0)]
#[case(-3)]
#[tokio::test]
async fn non_positive_receipts_are_rejected(#[case] quantity: i32) {
    let app = TestApp::new().await;
    let p = app.seed_product("SKU-RC", 2, 0).await;

    let err = app
        .state
        .services
        .stock
        .receive_stock(p.id, quantity)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
    assert_eq!(app.state.services.stock.get_available(p.id).await.unwrap(), 2);
}
