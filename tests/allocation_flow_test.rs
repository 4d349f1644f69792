mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;

use allocation_engine::{
    entities::order::OrderStatus,
    errors::ServiceError,
    services::allocation::{AllocationLine, RejectionReason},
};
use common::TestApp;

#[tokio::test]
async fn partial_allocation_splits_backorder_and_cancellation_keeps_stock() {
    let app = TestApp::new().await;
    let p = app.seed_product("SKU-P", 10, 0).await;
    let order = app.seed_order_with_items(OrderStatus::Pending, &[(p.id, 12)]).await;

    let result = app
        .state
        .services
        .allocation
        .allocate(order.id, vec![AllocationLine { product_id: p.id, qty: 10 }], Some(true))
        .await
        .expect("allocation succeeds");

    assert!(result.rejected.is_empty());
    assert_eq!(result.status, OrderStatus::PartiallyFulfilled);
    assert_eq!(result.total_shortage, 2);
    assert_eq!(result.shortage.len(), 1);
    assert_eq!(result.shortage[0].shortage, 2);
    assert_eq!(app.on_hand(p.id).await, 0);
    assert_eq!(app.allocated_qty(order.id, p.id).await, 10);

    let backorder = result.backorder.expect("backorder created");
    assert_eq!(backorder.parent_order_id, order.id);
    assert_eq!(backorder.shortage_qty, 2);
    assert_eq!(backorder.lines.len(), 1);
    assert_eq!(backorder.lines[0].product_id, p.id);
    assert_eq!(backorder.lines[0].qty, 2);
    assert_eq!(backorder.lines[0].unit_price_at_purchase, dec!(19.99));
    assert_eq!(backorder.order_number, format!("{}-BO1", order.order_number));

    let child = app.order(backorder.backorder_id).await;
    assert_eq!(child.status, OrderStatus::Pending);
    assert_eq!(child.parent_order_id, Some(order.id));
    assert_eq!(child.customer_id, order.customer_id);

    let parent_items = app.items(order.id).await;
    assert_eq!(parent_items.len(), 1);
    assert_eq!(parent_items[0].ordered_qty, 10);

    let canceled = app
        .state
        .services
        .cancellation
        .cancel_backorder(child.id, "supplier kosong")
        .await
        .expect("cancellation succeeds");
    assert_eq!(canceled.status, OrderStatus::Canceled);
    assert_eq!(canceled.abandoned_shortage, 2);
    assert_eq!(canceled.cancel_reason, "supplier kosong");
    assert_eq!(app.on_hand(p.id).await, 0);

    let child = app.order(child.id).await;
    assert_eq!(child.status, OrderStatus::Canceled);
    assert!(child.canceled_at.is_some());
}

#[tokio::test]
async fn reallocation_is_bounded_by_on_hand_plus_current_allocation() {
    // Default configuration, no split requested on either call.
    let app = TestApp::new().await;
    let p = app.seed_product("SKU-R", 8, 0).await;
    let order = app.seed_order_with_items(OrderStatus::Pending, &[(p.id, 10)]).await;
    let allocation = &app.state.services.allocation;

    let first = allocation
        .allocate(order.id, vec![AllocationLine { product_id: p.id, qty: 3 }], None)
        .await
        .expect("first allocation");
    assert!(first.backorder.is_none());
    assert_eq!(first.status, OrderStatus::PartiallyFulfilled);
    assert_eq!(app.on_hand(p.id).await, 5);
    assert_eq!(app.items(order.id).await[0].ordered_qty, 10);

    let result = allocation
        .allocate(order.id, vec![AllocationLine { product_id: p.id, qty: 7 }], None)
        .await
        .expect("re-allocation");

    assert!(result.rejected.is_empty());
    assert_eq!(app.on_hand(p.id).await, 1);
    assert_eq!(app.allocated_qty(order.id, p.id).await, 7);
    assert_eq!(result.total_shortage, 3);
    assert!(result.backorder.is_none());
}

#[tokio::test]
async fn configured_split_applies_when_the_request_is_silent() {
    let app = TestApp::with_auto_split(true).await;
    let p = app.seed_product("SKU-CS", 4, 0).await;
    let order = app.seed_order_with_items(OrderStatus::Pending, &[(p.id, 6)]).await;

    let result = app
        .state
        .services
        .allocation
        .allocate(order.id, vec![AllocationLine { product_id: p.id, qty: 4 }], None)
        .await
        .unwrap();

    let backorder = result.backorder.expect("configured split creates a backorder");
    assert_eq!(backorder.shortage_qty, 2);
    assert_eq!(app.items(order.id).await[0].ordered_qty, 4);
}

#[tokio::test]
async fn lowering_an_allocation_returns_stock() {
    let app = TestApp::new().await;
    let p = app.seed_product("SKU-L", 6, 0).await;
    let order = app.seed_order_with_items(OrderStatus::Pending, &[(p.id, 6)]).await;
    let allocation = &app.state.services.allocation;

    let full = allocation
        .allocate(order.id, vec![AllocationLine { product_id: p.id, qty: 6 }], None)
        .await
        .unwrap();
    assert_eq!(full.status, OrderStatus::Allocated);
    assert_eq!(app.on_hand(p.id).await, 0);

    let lowered = allocation
        .allocate(order.id, vec![AllocationLine { product_id: p.id, qty: 2 }], Some(false))
        .await
        .unwrap();
    assert_eq!(lowered.status, OrderStatus::PartiallyFulfilled);
    assert_eq!(app.on_hand(p.id).await, 4);
    assert_eq!(app.allocated_qty(order.id, p.id).await, 2);
}

#[tokio::test]
async fn allocating_the_same_quantities_twice_is_idempotent() {
    let app = TestApp::new().await;
    let a = app.seed_product("SKU-A", 20, 0).await;
    let b = app.seed_product("SKU-B", 20, 0).await;
    let order = app
        .seed_order_with_items(OrderStatus::Pending, &[(a.id, 5), (b.id, 4)])
        .await;
    let lines = vec![
        AllocationLine { product_id: a.id, qty: 5 },
        AllocationLine { product_id: b.id, qty: 4 },
    ];

    let first = app
        .state
        .services
        .allocation
        .allocate(order.id, lines.clone(), None)
        .await
        .unwrap();
    let on_hand_after_first = (app.on_hand(a.id).await, app.on_hand(b.id).await);

    let second = app
        .state
        .services
        .allocation
        .allocate(order.id, lines, None)
        .await
        .unwrap();

    assert_eq!(first.lines, second.lines);
    assert_eq!(second.status, OrderStatus::Allocated);
    assert_eq!(
        (app.on_hand(a.id).await, app.on_hand(b.id).await),
        on_hand_after_first
    );
    assert_eq!(on_hand_after_first, (15, 16));
}

#[tokio::test]
async fn invalid_lines_are_rejected_individually() {
    let app = TestApp::new().await;
    let a = app.seed_product("SKU-A", 3, 0).await;
    let b = app.seed_product("SKU-B", 10, 0).await;
    let stranger = app.seed_product("SKU-X", 10, 0).await;
    let order = app
        .seed_order_with_items(OrderStatus::Pending, &[(a.id, 5), (b.id, 4)])
        .await;

    let result = app
        .state
        .services
        .allocation
        .allocate(
            order.id,
            vec![
                AllocationLine { product_id: a.id, qty: 4 },
                AllocationLine { product_id: b.id, qty: 4 },
                AllocationLine { product_id: b.id, qty: 1 },
                AllocationLine { product_id: stranger.id, qty: 1 },
            ],
            Some(false),
        )
        .await
        .expect("partial success is not an error");

    let reason_of = |product_id| {
        result
            .rejected
            .iter()
            .filter(|line| line.product_id == product_id)
            .map(|line| line.reason)
            .collect::<Vec<_>>()
    };
    assert_eq!(reason_of(a.id), vec![RejectionReason::ExceedsAvailable]);
    assert_eq!(reason_of(b.id), vec![RejectionReason::DuplicateLine]);
    assert_eq!(reason_of(stranger.id), vec![RejectionReason::NotOnOrder]);

    let rejected_a = result
        .rejected
        .iter()
        .find(|line| line.product_id == a.id)
        .unwrap();
    assert_eq!(rejected_a.max_allocatable, 3);

    assert_eq!(app.allocated_qty(order.id, a.id).await, 0);
    assert_eq!(app.allocated_qty(order.id, b.id).await, 4);
    assert_eq!(app.on_hand(a.id).await, 3);
    assert_eq!(app.on_hand(b.id).await, 6);
    assert_eq!(app.on_hand(stranger.id).await, 10);
    assert_eq!(result.total_shortage, 5);
}

#[tokio::test]
async fn over_ordered_and_negative_lines_are_rejected() {
    let app = TestApp::new().await;
    let p = app.seed_product("SKU-O", 50, 0).await;
    let order = app.seed_order_with_items(OrderStatus::Pending, &[(p.id, 5)]).await;

    let too_many = app
        .state
        .services
        .allocation
        .allocate(order.id, vec![AllocationLine { product_id: p.id, qty: 6 }], Some(false))
        .await
        .unwrap();
    assert_eq!(too_many.rejected[0].reason, RejectionReason::ExceedsOrdered);
    assert_eq!(too_many.rejected[0].max_allocatable, 5);

    let negative = app
        .state
        .services
        .allocation
        .allocate(order.id, vec![AllocationLine { product_id: p.id, qty: -1 }], Some(false))
        .await
        .unwrap();
    assert_eq!(negative.rejected[0].reason, RejectionReason::NegativeQuantity);
    assert_eq!(app.on_hand(p.id).await, 50);
}

#[tokio::test]
async fn shortage_is_conserved_across_parent_and_backorder() {
    let app = TestApp::new().await;
    let a = app.seed_product("SKU-A", 4, 0).await;
    let b = app.seed_product("SKU-B", 1, 0).await;
    let order = app.seed_order(OrderStatus::WaitingInvoice).await;
    app.add_item(order.id, a.id, 3, dec!(5.00)).await;
    app.add_item(order.id, a.id, 4, dec!(6.00)).await;
    app.add_item(order.id, b.id, 2, dec!(7.50)).await;

    let result = app
        .state
        .services
        .allocation
        .auto_fill(order.id, Some(true))
        .await
        .unwrap();
    assert_eq!(result.total_shortage, 4);
    let backorder = result.backorder.expect("backorder created");
    assert_eq!(backorder.shortage_qty, 4);

    let parent = app.state.services.allocation.shortage_summary(order.id).await.unwrap();
    let children = app.state.services.backorders.list_backorders(order.id).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(parent.total_shortage + children[0].total_shortage, 4);
    assert_eq!(parent.total_shortage, 0);

    // Newest item of A gave up three units at its own price.
    let moved_a = backorder
        .lines
        .iter()
        .find(|line| line.product_id == a.id)
        .unwrap();
    assert_eq!(moved_a.qty, 3);
    assert_eq!(moved_a.unit_price_at_purchase, dec!(6.00));

    for line in &parent.lines {
        assert_eq!(line.shortage, line.ordered_qty - line.allocated_qty);
    }
    assert_eq!(app.order(order.id).await.status, OrderStatus::PartiallyFulfilled);
}

#[tokio::test]
async fn auto_fill_takes_what_is_free() {
    let app = TestApp::with_auto_split(false).await;
    let a = app.seed_product("SKU-A", 2, 0).await;
    let b = app.seed_product("SKU-B", 9, 0).await;
    let order = app
        .seed_order_with_items(OrderStatus::Pending, &[(a.id, 5), (b.id, 3)])
        .await;

    let result = app
        .state
        .services
        .allocation
        .auto_fill(order.id, None)
        .await
        .unwrap();

    assert!(result.backorder.is_none());
    assert_eq!(app.allocated_qty(order.id, a.id).await, 2);
    assert_eq!(app.allocated_qty(order.id, b.id).await, 3);
    assert_eq!(result.total_shortage, 3);
    assert_eq!(result.status, OrderStatus::PartiallyFulfilled);

    let preview = app.state.services.allocation.preview(order.id).await.unwrap();
    let line_a = preview.lines.iter().find(|l| l.product_id == a.id).unwrap();
    assert_eq!(line_a.on_hand_quantity, 0);
    assert_eq!(line_a.available, 2);
    assert_eq!(line_a.max_allocatable, 2);
    assert_eq!(line_a.shortage, 3);
    assert!(preview.editable);
}

#[tokio::test]
async fn allocation_is_locked_once_ready_to_ship() {
    let app = TestApp::new().await;
    let p = app.seed_product("SKU-P", 5, 0).await;
    let order = app.seed_order_with_items(OrderStatus::Pending, &[(p.id, 5)]).await;
    app.state
        .services
        .allocation
        .allocate(order.id, vec![AllocationLine { product_id: p.id, qty: 5 }], None)
        .await
        .unwrap();
    app.state
        .services
        .lifecycle
        .transition_order(order.id, OrderStatus::ReadyToShip)
        .await
        .unwrap();

    let err = app
        .state
        .services
        .allocation
        .allocate(order.id, vec![AllocationLine { product_id: p.id, qty: 1 }], None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::IllegalTransition(_));
    assert_eq!(app.on_hand(p.id).await, 0);
    assert_eq!(app.allocated_qty(order.id, p.id).await, 5);
}

#[tokio::test]
async fn allocation_edits_are_allowed_on_hold() {
    let app = TestApp::new().await;
    let p = app.seed_product("SKU-H", 5, 0).await;
    let order = app.seed_order_with_items(OrderStatus::Hold, &[(p.id, 4)]).await;

    let result = app
        .state
        .services
        .allocation
        .allocate(order.id, vec![AllocationLine { product_id: p.id, qty: 4 }], None)
        .await
        .unwrap();

    assert_eq!(result.status, OrderStatus::Hold);
    assert_eq!(app.on_hand(p.id).await, 1);
}

#[tokio::test]
async fn ready_to_ship_requires_zero_shortage() {
    let app = TestApp::new().await;
    let p = app.seed_product("SKU-S", 1, 0).await;
    let order = app.seed_order_with_items(OrderStatus::Pending, &[(p.id, 3)]).await;
    app.state
        .services
        .allocation
        .auto_fill(order.id, Some(false))
        .await
        .unwrap();

    let err = app
        .state
        .services
        .lifecycle
        .transition_order(order.id, OrderStatus::ReadyToShip)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::IllegalTransition(_));
    assert_eq!(app.order(order.id).await.status, OrderStatus::PartiallyFulfilled);
}

#[tokio::test]
async fn aggregate_shortages_sum_across_open_orders() {
    let app = TestApp::with_auto_split(false).await;
    let p = app.seed_product("SKU-AG", 3, 4).await;
    let first = app.seed_order_with_items(OrderStatus::Pending, &[(p.id, 5)]).await;
    app.seed_order_with_items(OrderStatus::Pending, &[(p.id, 2)]).await;
    app.seed_order_with_items(OrderStatus::Shipped, &[(p.id, 9)]).await;

    app.state
        .services
        .allocation
        .auto_fill(first.id, None)
        .await
        .unwrap();

    let lines = app.state.services.allocation.aggregate_shortages().await.unwrap();
    assert_eq!(lines.len(), 1);
    let line = &lines[0];
    assert_eq!(line.product_id, p.id);
    assert_eq!(line.total_shortage, 4);
    assert_eq!(line.order_count, 2);
    assert_eq!(line.on_hand_quantity, 0);
    // Covers the open shortage and restores min_stock.
    assert_eq!(line.suggested_reorder_qty, 8);
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = TestApp::new().await;
    let err = app
        .state
        .services
        .allocation
        .auto_fill(uuid::Uuid::new_v4(), None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
