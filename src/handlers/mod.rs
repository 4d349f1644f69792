pub mod allocations;
pub mod backorders;
pub mod health;
pub mod issues;
pub mod orders;
pub mod stock;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::events::EventSender;
use crate::services::{
    allocation::AllocationService,
    backorder::BackorderService,
    cancellation::CancellationService,
    delivery_issues::{CourierDirectory, DbCourierDirectory, DeliveryIssueService},
    order_lifecycle::OrderLifecycleService,
    stock_ledger::{KeyedLocks, StockLedger},
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers.
///
/// Every service that mutates an order shares one set of order locks, and
/// every service that moves stock shares one set of product locks.
#[derive(Clone)]
pub struct AppServices {
    pub stock: Arc<StockLedger>,
    pub allocation: Arc<AllocationService>,
    pub lifecycle: Arc<OrderLifecycleService>,
    pub backorders: Arc<BackorderService>,
    pub cancellation: Arc<CancellationService>,
    pub delivery_issues: Arc<DeliveryIssueService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        auto_split_backorder: bool,
    ) -> Self {
        let couriers: Arc<dyn CourierDirectory> = Arc::new(DbCourierDirectory::new(db.clone()));
        Self::with_courier_directory(db, event_sender, auto_split_backorder, couriers)
    }

    /// Same as [`AppServices::new`] with a caller-supplied courier source.
    pub fn with_courier_directory(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        auto_split_backorder: bool,
        couriers: Arc<dyn CourierDirectory>,
    ) -> Self {
        let order_locks = Arc::new(KeyedLocks::new());
        let product_locks = Arc::new(KeyedLocks::new());

        let stock = Arc::new(StockLedger::new(
            db.clone(),
            product_locks.clone(),
            event_sender.clone(),
        ));
        let allocation = Arc::new(AllocationService::new(
            db.clone(),
            order_locks.clone(),
            product_locks,
            event_sender.clone(),
            auto_split_backorder,
        ));
        let lifecycle = Arc::new(OrderLifecycleService::new(
            db.clone(),
            order_locks.clone(),
            event_sender.clone(),
        ));
        let backorders = Arc::new(BackorderService::new(db.clone()));
        let cancellation = Arc::new(CancellationService::new(
            db.clone(),
            order_locks.clone(),
            event_sender.clone(),
        ));
        let delivery_issues = Arc::new(DeliveryIssueService::new(
            db,
            order_locks,
            couriers,
            event_sender,
        ));

        Self {
            stock,
            allocation,
            lifecycle,
            backorders,
            cancellation,
            delivery_issues,
        }
    }
}
