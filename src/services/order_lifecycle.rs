use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectionTrait, DatabaseConnection, EntityTrait,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::order::{self, Entity as OrderEntity, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    services::{allocation, stock_ledger::KeyedLocks},
};

/// What is driving a status change. Some edges belong to exactly one cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum TransitionCause {
    /// An allocation save recomputed the shortage.
    Allocation,
    /// A courier reported a delivery shortage.
    IssueReported,
    /// The open delivery issue was resolved.
    IssueResolved,
    /// An operator canceled the remaining shortfall.
    Cancellation,
    /// Any other operator-driven move.
    Operator,
}

/// The transition table.
pub fn can_transition(from: OrderStatus, to: OrderStatus, cause: TransitionCause) -> bool {
    use OrderStatus::*;

    match cause {
        TransitionCause::Allocation => matches!(
            (from, to),
            (Pending | WaitingInvoice | PartiallyFulfilled, Allocated)
                | (Pending | WaitingInvoice | Allocated, PartiallyFulfilled)
        ),
        TransitionCause::IssueReported => matches!((from, to), (Shipped, Hold)),
        TransitionCause::IssueResolved => matches!((from, to), (Hold, Shipped)),
        TransitionCause::Cancellation => from.is_allocation_editable() && to == Canceled,
        TransitionCause::Operator => matches!(
            (from, to),
            (Pending, WaitingInvoice)
                | (Pending | WaitingInvoice | Allocated | PartiallyFulfilled, DebtPending)
                | (DebtPending, WaitingInvoice)
                | (Allocated | PartiallyFulfilled | DebtPending, ReadyToShip)
                | (ReadyToShip, Shipped)
                | (Shipped, Delivered)
                | (Delivered, Completed)
        ),
    }
}

pub fn check_transition(
    from: OrderStatus,
    to: OrderStatus,
    cause: TransitionCause,
) -> Result<(), ServiceError> {
    if can_transition(from, to, cause) {
        Ok(())
    } else {
        Err(ServiceError::IllegalTransition(format!(
            "cannot move order from {} to {} ({})",
            from, to, cause
        )))
    }
}

/// Status an order should hold after an allocation save.
///
/// Only the pre-shipping statuses follow the shortage; `hold` and
/// `debt_pending` keep their status while allocation is edited. A parent
/// whose remainder was split off stays `partially_fulfilled`.
pub fn status_after_allocation(
    current: OrderStatus,
    total_shortage: i32,
    has_backorders: bool,
) -> OrderStatus {
    use OrderStatus::*;

    match current {
        Pending | WaitingInvoice | Allocated | PartiallyFulfilled => {
            if total_shortage > 0 || (current == PartiallyFulfilled && has_backorders) {
                PartiallyFulfilled
            } else {
                Allocated
            }
        }
        other => other,
    }
}

/// Validates and persists a status change inside the caller's transaction.
pub async fn apply_transition<C>(
    conn: &C,
    order: order::Model,
    to: OrderStatus,
    cause: TransitionCause,
) -> Result<order::Model, ServiceError>
where
    C: ConnectionTrait,
{
    check_transition(order.status, to, cause)?;

    let from = order.status;
    let order_id = order.id;
    let version = order.version;
    let mut active: order::ActiveModel = order.into();
    active.status = Set(to);
    active.version = Set(version + 1);
    let updated = active.update(conn).await.map_err(|e| {
        error!(error = %e, order_id = %order_id, "Failed to persist order status");
        ServiceError::db_error(e)
    })?;

    metrics::ORDER_TRANSITIONS
        .with_label_values(&[&to.to_string()])
        .inc();
    info!(order_id = %order_id, from = %from, to = %to, cause = %cause, "Order status changed");
    Ok(updated)
}

pub(crate) async fn find_order<C>(conn: &C, order_id: Uuid) -> Result<order::Model, ServiceError>
where
    C: ConnectionTrait,
{
    OrderEntity::find_by_id(order_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::order_not_found(order_id))
}

/// Operator-facing lifecycle moves.
#[derive(Clone)]
pub struct OrderLifecycleService {
    db: Arc<DatabaseConnection>,
    order_locks: Arc<KeyedLocks>,
    event_sender: EventSender,
}

impl OrderLifecycleService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        order_locks: Arc<KeyedLocks>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            order_locks,
            event_sender,
        }
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        find_order(&*self.db, order_id).await
    }

    /// Moves an order along an operator edge. Requesting the current status
    /// is a no-op.
    #[instrument(skip(self), fields(order_id = %order_id, to = %to))]
    pub async fn transition_order(
        &self,
        order_id: Uuid,
        to: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let _guard = self.order_locks.lock(order_id).await;

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transition transaction");
            ServiceError::db_error(e)
        })?;

        let order = find_order(&txn, order_id).await?;
        if order.status == to {
            return Ok(order);
        }
        let from = order.status;

        if let Err(e) = check_transition(from, to, TransitionCause::Operator) {
            warn!(order_id = %order_id, from = %from, to = %to, "Operator transition rejected");
            return Err(e);
        }

        if to == OrderStatus::ReadyToShip {
            let total_shortage = allocation::total_shortage(&txn, order_id).await?;
            if total_shortage > 0 {
                warn!(order_id = %order_id, total_shortage, "Order still short, not ready to ship");
                return Err(ServiceError::IllegalTransition(format!(
                    "order {} still has a shortage of {}",
                    order_id, total_shortage
                )));
            }
        }

        let updated = apply_transition(&txn, order, to, TransitionCause::Operator).await?;
        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit transition");
            ServiceError::db_error(e)
        })?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: from,
                new_status: to,
            })
            .await;

        Ok(updated)
    }
}
