#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use allocation_engine::{
    config::AppConfig,
    db,
    entities::{
        allocation,
        courier::{self, DELIVERY_ROLE},
        order::{self, OrderStatus},
        order_item, product,
    },
    events::{self, EventSender},
    AppState,
};

/// Helper harness for spinning up an application state backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state and the
    /// default (opt-in) backorder split.
    pub async fn new() -> Self {
        Self::with_auto_split(false).await
    }

    pub async fn with_auto_split(auto_split_backorder: bool) -> Self {
        let mut cfg = AppConfig::new("sqlite::memory:".to_string(), "test".to_string());
        // One connection keeps every query on the same in-memory database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.auto_split_backorder = auto_split_backorder;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(Arc::new(pool), cfg, event_sender);
        let router = allocation_engine::app_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    pub fn db(&self) -> &sea_orm::DatabaseConnection {
        &self.state.db
    }

    /// Send a request against the router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn seed_product(&self, sku: &str, on_hand_quantity: i32, min_stock: i32) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(sku.to_string()),
            name: Set(format!("Test Product {}", sku)),
            on_hand_quantity: Set(on_hand_quantity),
            min_stock: Set(min_stock),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed product for tests")
    }

    pub async fn seed_order(&self, status: OrderStatus) -> order::Model {
        let id = Uuid::new_v4();
        order::ActiveModel {
            id: Set(id),
            order_number: Set(format!("SO-{}", &id.simple().to_string()[..8])),
            customer_id: Set(Uuid::new_v4()),
            status: Set(status),
            parent_order_id: Set(None),
            courier_id: Set(None),
            cancel_reason: Set(None),
            canceled_at: Set(None),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed order for tests")
    }

    pub async fn add_item(
        &self,
        order_id: Uuid,
        product_id: Uuid,
        ordered_qty: i32,
        unit_price: Decimal,
    ) -> order_item::Model {
        order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(product_id),
            ordered_qty: Set(ordered_qty),
            unit_price_at_purchase: Set(unit_price),
            created_at: Set(Utc::now()),
        }
        .insert(self.db())
        .await
        .expect("seed order item for tests")
    }

    /// Order with one item per `(product, qty)` pair.
    pub async fn seed_order_with_items(
        &self,
        status: OrderStatus,
        lines: &[(Uuid, i32)],
    ) -> order::Model {
        let order = self.seed_order(status).await;
        for (product_id, qty) in lines {
            self.add_item(order.id, *product_id, *qty, Decimal::new(1999, 2))
                .await;
        }
        order
    }

    pub async fn seed_courier(&self, is_active: bool) -> courier::Model {
        self.seed_courier_with_role(DELIVERY_ROLE, is_active).await
    }

    pub async fn seed_courier_with_role(&self, role: &str, is_active: bool) -> courier::Model {
        courier::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set("Test Courier".to_string()),
            role: Set(role.to_string()),
            is_active: Set(is_active),
            created_at: Set(Utc::now()),
        }
        .insert(self.db())
        .await
        .expect("seed courier for tests")
    }

    /// Moves an order straight to `status`, bypassing the transition table.
    pub async fn force_status(&self, order_id: Uuid, status: OrderStatus) -> order::Model {
        let order = self.order(order_id).await;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(status);
        active
            .update(self.db())
            .await
            .expect("force order status for tests")
    }

    pub async fn order(&self, order_id: Uuid) -> order::Model {
        order::Entity::find_by_id(order_id)
            .one(self.db())
            .await
            .expect("load order")
            .expect("order exists")
    }

    pub async fn on_hand(&self, product_id: Uuid) -> i32 {
        product::Entity::find_by_id(product_id)
            .one(self.db())
            .await
            .expect("load product")
            .expect("product exists")
            .on_hand_quantity
    }

    pub async fn allocated_qty(&self, order_id: Uuid, product_id: Uuid) -> i32 {
        allocation::Entity::find()
            .filter(allocation::Column::OrderId.eq(order_id))
            .filter(allocation::Column::ProductId.eq(product_id))
            .one(self.db())
            .await
            .expect("load allocation")
            .map(|row| row.allocated_qty)
            .unwrap_or(0)
    }

    pub async fn items(&self, order_id: Uuid) -> Vec<order_item::Model> {
        order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(self.db())
            .await
            .expect("load order items")
    }

    pub async fn children(&self, order_id: Uuid) -> Vec<order::Model> {
        order::Entity::find()
            .filter(order::Column::ParentOrderId.eq(order_id))
            .all(self.db())
            .await
            .expect("load child orders")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Reads a response body as JSON.
pub async fn response_json(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&body).expect("response body is json")
}
