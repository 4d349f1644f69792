//! Delivery shortage escalation.
//!
//! A courier who finds a count mismatch after dispatch reports it; the order
//! goes on `hold` and an issue with a fixed 24 hour deadline is opened. An
//! operator resolves it by reassigning a courier, which puts the order back
//! to `shipped`. Missing the deadline changes nothing but [`is_overdue`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{
        courier::{self, Entity as CourierEntity, DELIVERY_ROLE},
        order::{self, Entity as OrderEntity, OrderStatus},
        order_issue::{self, Entity as OrderIssueEntity, IssueType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    services::{
        justification,
        order_lifecycle::{apply_transition, check_transition, find_order, TransitionCause},
        stock_ledger::KeyedLocks,
        MIN_JUSTIFICATION_LEN,
    },
};

/// Time allowed to resolve a reported shortage.
pub const SLA_WINDOW_HOURS: i64 = 24;

pub fn due_at(reported_at: DateTime<Utc>) -> DateTime<Utc> {
    reported_at + Duration::hours(SLA_WINDOW_HOURS)
}

/// The only place overdue is decided. Never stored.
pub fn is_overdue(issue: &order_issue::Model, now: DateTime<Utc>) -> bool {
    issue.resolved_at.is_none() && now > issue.due_at
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IssueView {
    pub id: Uuid,
    pub order_id: Uuid,
    pub issue_type: IssueType,
    pub note: String,
    pub evidence_url: Option<String>,
    pub reported_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_note: Option<String>,
    pub reassigned_courier_id: Option<Uuid>,
    pub overdue: bool,
}

impl IssueView {
    pub fn at(issue: order_issue::Model, now: DateTime<Utc>) -> Self {
        let overdue = is_overdue(&issue, now);
        Self {
            id: issue.id,
            order_id: issue.order_id,
            issue_type: issue.issue_type,
            note: issue.note,
            evidence_url: issue.evidence_url,
            reported_at: issue.reported_at,
            due_at: issue.due_at,
            resolved_at: issue.resolved_at,
            resolution_note: issue.resolution_note,
            reassigned_courier_id: issue.reassigned_courier_id,
            overdue,
        }
    }
}

/// Source of valid courier ids.
#[async_trait]
pub trait CourierDirectory: Send + Sync {
    /// True when the id names an active courier with the delivery role.
    async fn is_active_courier(&self, courier_id: Uuid) -> Result<bool, ServiceError>;
}

/// Courier directory backed by the `couriers` table.
#[derive(Clone)]
pub struct DbCourierDirectory {
    db: Arc<DatabaseConnection>,
}

impl DbCourierDirectory {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CourierDirectory for DbCourierDirectory {
    async fn is_active_courier(&self, courier_id: Uuid) -> Result<bool, ServiceError> {
        let found = CourierEntity::find_by_id(courier_id)
            .filter(courier::Column::Role.eq(DELIVERY_ROLE))
            .filter(courier::Column::IsActive.eq(true))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(found.is_some())
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReportIssueRequest {
    pub note: String,
    pub evidence_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ResolveIssueRequest {
    pub courier_id: Uuid,
    pub resolution_note: String,
}

async fn open_issue<C>(conn: &C, order_id: Uuid) -> Result<Option<order_issue::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    OrderIssueEntity::find()
        .filter(order_issue::Column::OrderId.eq(order_id))
        .filter(order_issue::Column::ResolvedAt.is_null())
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Closes the order's open issue, if any, without a courier reassignment.
/// Runs inside the caller's transaction when an order leaves the delivery
/// flow for good.
pub(crate) async fn close_open_issue<C>(
    conn: &C,
    order_id: Uuid,
    note: &str,
    now: DateTime<Utc>,
) -> Result<Option<Uuid>, ServiceError>
where
    C: ConnectionTrait,
{
    let Some(issue) = open_issue(conn, order_id).await? else {
        return Ok(None);
    };
    let issue_id = issue.id;
    let mut active: order_issue::ActiveModel = issue.into();
    active.resolved_at = Set(Some(now));
    active.resolution_note = Set(Some(note.to_string()));
    active.update(conn).await.map_err(|e| {
        error!(error = %e, issue_id = %issue_id, "Failed to close issue");
        ServiceError::db_error(e)
    })?;
    Ok(Some(issue_id))
}

fn invalid_note(field: &str) -> ServiceError {
    ServiceError::InvalidNote(format!(
        "{} must be at least {} characters",
        field, MIN_JUSTIFICATION_LEN
    ))
}

#[derive(Clone)]
pub struct DeliveryIssueService {
    db: Arc<DatabaseConnection>,
    order_locks: Arc<KeyedLocks>,
    couriers: Arc<dyn CourierDirectory>,
    event_sender: EventSender,
}

impl DeliveryIssueService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        order_locks: Arc<KeyedLocks>,
        couriers: Arc<dyn CourierDirectory>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            order_locks,
            couriers,
            event_sender,
        }
    }

    pub async fn report_issue(
        &self,
        order_id: Uuid,
        request: ReportIssueRequest,
    ) -> Result<IssueView, ServiceError> {
        self.report_issue_at(order_id, request, Utc::now()).await
    }

    /// Opens a shortage issue on a shipped order and puts it on hold.
    #[instrument(skip(self, request), fields(order_id = %order_id))]
    pub async fn report_issue_at(
        &self,
        order_id: Uuid,
        request: ReportIssueRequest,
        now: DateTime<Utc>,
    ) -> Result<IssueView, ServiceError> {
        let note = justification(&request.note).ok_or_else(|| invalid_note("note"))?;
        let evidence_url = request
            .evidence_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        let _guard = self.order_locks.lock(order_id).await;

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin issue report transaction");
            ServiceError::db_error(e)
        })?;

        let order = find_order(&txn, order_id).await?;
        if let Some(existing) = open_issue(&txn, order_id).await? {
            warn!(order_id = %order_id, issue_id = %existing.id, "Issue already open");
            return Err(ServiceError::IssueAlreadyOpen(order_id));
        }
        let old_status = order.status;
        check_transition(old_status, OrderStatus::Hold, TransitionCause::IssueReported)?;

        let issue = order_issue::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            issue_type: Set(IssueType::Shortage),
            note: Set(note.to_string()),
            evidence_url: Set(evidence_url),
            reported_at: Set(now),
            due_at: Set(due_at(now)),
            resolved_at: Set(None),
            resolution_note: Set(None),
            reassigned_courier_id: Set(None),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to insert order issue");
            ServiceError::db_error(e)
        })?;

        apply_transition(&txn, order, OrderStatus::Hold, TransitionCause::IssueReported).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit issue report");
            ServiceError::db_error(e)
        })?;

        metrics::ISSUES_REPORTED.inc();
        info!(order_id = %order_id, issue_id = %issue.id, due_at = %issue.due_at, "Delivery shortage reported");
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status: OrderStatus::Hold,
            })
            .await;
        self.event_sender
            .send_or_log(Event::ShortageReported {
                order_id,
                issue_id: issue.id,
            })
            .await;

        Ok(IssueView::at(issue, now))
    }

    pub async fn resolve_issue(
        &self,
        order_id: Uuid,
        request: ResolveIssueRequest,
    ) -> Result<IssueView, ServiceError> {
        self.resolve_issue_at(order_id, request, Utc::now()).await
    }

    /// Closes the open issue, rebinds the order to `courier_id` and returns
    /// it to `shipped`.
    #[instrument(skip(self, request), fields(order_id = %order_id, courier_id = %request.courier_id))]
    pub async fn resolve_issue_at(
        &self,
        order_id: Uuid,
        request: ResolveIssueRequest,
        now: DateTime<Utc>,
    ) -> Result<IssueView, ServiceError> {
        let resolution_note =
            justification(&request.resolution_note).ok_or_else(|| invalid_note("resolution_note"))?;
        let courier_id = request.courier_id;

        let _guard = self.order_locks.lock(order_id).await;

        let order = find_order(&*self.db, order_id).await?;
        if !self.couriers.is_active_courier(courier_id).await? {
            warn!(courier_id = %courier_id, "Unknown or inactive courier");
            return Err(ServiceError::NotFound(format!(
                "Courier {} is not an active delivery courier",
                courier_id
            )));
        }

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin issue resolution transaction");
            ServiceError::db_error(e)
        })?;

        let issue = open_issue(&txn, order_id).await?.ok_or_else(|| {
            ServiceError::NotFound(format!("No open issue for order {}", order_id))
        })?;
        let old_status = order.status;
        check_transition(old_status, OrderStatus::Shipped, TransitionCause::IssueResolved)?;

        let issue_id = issue.id;
        let mut active: order_issue::ActiveModel = issue.into();
        active.resolved_at = Set(Some(now));
        active.resolution_note = Set(Some(resolution_note.to_string()));
        active.reassigned_courier_id = Set(Some(courier_id));
        let resolved = active.update(&txn).await.map_err(|e| {
            error!(error = %e, "Failed to persist issue resolution");
            ServiceError::db_error(e)
        })?;

        let mut rebound: order::ActiveModel = order.clone().into();
        rebound.courier_id = Set(Some(courier_id));
        let order = rebound.update(&txn).await.map_err(ServiceError::db_error)?;
        apply_transition(&txn, order, OrderStatus::Shipped, TransitionCause::IssueResolved).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit issue resolution");
            ServiceError::db_error(e)
        })?;

        metrics::ISSUES_RESOLVED.inc();
        info!(order_id = %order_id, issue_id = %issue_id, courier_id = %courier_id, "Delivery shortage resolved");
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status: OrderStatus::Shipped,
            })
            .await;
        self.event_sender
            .send_or_log(Event::ShortageResolved {
                order_id,
                issue_id,
                courier_id,
            })
            .await;

        Ok(IssueView::at(resolved, now))
    }

    pub async fn current_issue(&self, order_id: Uuid) -> Result<IssueView, ServiceError> {
        self.current_issue_at(order_id, Utc::now()).await
    }

    /// The open issue of an order, or its most recent resolved one.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn current_issue_at(
        &self,
        order_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<IssueView, ServiceError> {
        let db = &*self.db;
        let order = find_order(db, order_id).await?;

        let issue = match open_issue(db, order_id).await? {
            Some(issue) => issue,
            None => OrderIssueEntity::find()
                .filter(order_issue::Column::OrderId.eq(order_id))
                .order_by_desc(order_issue::Column::ReportedAt)
                .one(db)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("No issue reported for order {}", order_id))
                })?,
        };

        let mut view = IssueView::at(issue, now);
        // Nothing is left to deliver on a terminal order.
        if order.status.is_terminal() {
            view.overdue = false;
        }
        Ok(view)
    }

    pub async fn list_overdue(&self) -> Result<Vec<IssueView>, ServiceError> {
        self.list_overdue_at(Utc::now()).await
    }

    /// Unresolved issues past their deadline on orders that are still live,
    /// most overdue first.
    #[instrument(skip(self))]
    pub async fn list_overdue_at(&self, now: DateTime<Utc>) -> Result<Vec<IssueView>, ServiceError> {
        let db = &*self.db;
        let candidates = OrderIssueEntity::find()
            .filter(order_issue::Column::ResolvedAt.is_null())
            .order_by_asc(order_issue::Column::DueAt)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let overdue: Vec<order_issue::Model> = candidates
            .into_iter()
            .filter(|issue| is_overdue(issue, now))
            .collect();

        let live_orders: std::collections::HashSet<Uuid> = OrderEntity::find()
            .filter(order::Column::Id.is_in(overdue.iter().map(|i| i.order_id).collect::<Vec<_>>()))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .filter(|o| !o.status.is_terminal())
            .map(|o| o.id)
            .collect();

        Ok(overdue
            .into_iter()
            .filter(|issue| live_orders.contains(&issue.order_id))
            .map(|issue| IssueView::at(issue, now))
            .collect())
    }
}
