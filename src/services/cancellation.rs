use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::order::{self, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    services::{
        allocation, delivery_issues, justification,
        order_lifecycle::{check_transition, find_order, TransitionCause},
        stock_ledger::KeyedLocks,
        MIN_JUSTIFICATION_LEN,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CancellationResult {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub cancel_reason: String,
    pub canceled_at: chrono::DateTime<Utc>,
    /// Quantity given up; committed stock stays where it is.
    pub abandoned_shortage: i32,
}

/// Operator termination of an order's unresolved shortfall.
#[derive(Clone)]
pub struct CancellationService {
    db: Arc<DatabaseConnection>,
    order_locks: Arc<KeyedLocks>,
    event_sender: EventSender,
}

impl CancellationService {
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

    /// Cancels an order that still carries a shortage. Already allocated
    /// quantity is not released.
    #[instrument(skip(self, reason), fields(order_id = %order_id))]
    pub async fn cancel_backorder(
        &self,
        order_id: Uuid,
        reason: &str,
    ) -> Result<CancellationResult, ServiceError> {
        let reason = justification(reason).ok_or_else(|| {
            ServiceError::InvalidReason(format!(
                "reason must be at least {} characters",
                MIN_JUSTIFICATION_LEN
            ))
        })?;

        let _guard = self.order_locks.lock(order_id).await;

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin cancellation transaction");
            ServiceError::db_error(e)
        })?;

        let order = find_order(&txn, order_id).await?;
        let old_status = order.status;
        if let Err(e) = check_transition(old_status, OrderStatus::Canceled, TransitionCause::Cancellation) {
            warn!(order_id = %order_id, status = %old_status, "Cancellation rejected");
            return Err(e);
        }

        let abandoned_shortage = allocation::total_shortage(&txn, order_id).await?;
        if abandoned_shortage <= 0 {
            warn!(order_id = %order_id, "Cancellation rejected, nothing outstanding");
            return Err(ServiceError::IllegalTransition(format!(
                "order {} has no outstanding shortage to cancel",
                order_id
            )));
        }

        let now = Utc::now();
        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Canceled);
        active.cancel_reason = Set(Some(reason.to_string()));
        active.canceled_at = Set(Some(now));
        active.version = Set(version + 1);
        let updated = active.update(&txn).await.map_err(|e| {
            error!(error = %e, "Failed to persist cancellation");
            ServiceError::db_error(e)
        })?;
        let closed_issue = delivery_issues::close_open_issue(
            &txn,
            order_id,
            &format!("order canceled: {}", reason),
            now,
        )
        .await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit cancellation");
            ServiceError::db_error(e)
        })?;

        metrics::BACKORDERS_CANCELED.inc();
        metrics::ORDER_TRANSITIONS
            .with_label_values(&[&OrderStatus::Canceled.to_string()])
            .inc();
        if let Some(issue_id) = closed_issue {
            info!(order_id = %order_id, issue_id = %issue_id, "Open delivery issue closed by cancellation");
        }
        info!(
            order_id = %order_id,
            from = %old_status,
            abandoned_shortage,
            "Backorder canceled"
        );

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status: OrderStatus::Canceled,
            })
            .await;
        self.event_sender
            .send_or_log(Event::BackorderCanceled {
                order_id,
                reason: reason.to_string(),
            })
            .await;

        Ok(CancellationResult {
            order_id,
            status: updated.status,
            cancel_reason: reason.to_string(),
            canceled_at: now,
            abandoned_shortage,
        })
    }
}
