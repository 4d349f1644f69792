use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, Iterable, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{
        allocation::{self, Entity as AllocationEntity},
        order::{self, Entity as OrderEntity, OrderStatus},
        order_item::{self, Entity as OrderItemEntity},
        product::{self, Entity as ProductEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    services::{
        backorder::{self, BackorderSummary},
        order_lifecycle::{self, find_order, TransitionCause},
        stock_ledger::{KeyedLocks, StockLedger},
    },
};

/// Requested commitment for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AllocationLine {
    pub product_id: Uuid,
    pub qty: i32,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RejectionReason {
    /// The product is not ordered on this order.
    NotOnOrder,
    /// The product appeared earlier in the same request.
    DuplicateLine,
    NegativeQuantity,
    /// More than the order's summed `ordered_qty`.
    ExceedsOrdered,
    /// More than `on_hand_quantity + current allocated_qty`.
    ExceedsAvailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RejectedLine {
    pub product_id: Uuid,
    pub requested_qty: i32,
    pub max_allocatable: i32,
    pub reason: RejectionReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AllocatedLine {
    pub product_id: Uuid,
    pub allocated_qty: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ShortageLine {
    pub product_id: Uuid,
    pub ordered_qty: i32,
    pub allocated_qty: i32,
    pub shortage: i32,
}

/// Outcome of one allocation round. Rejected lines do not fail the call.
///
/// `shortage` is what this round left uncommitted; when a backorder was
/// split off it now lives on the child named in `backorder`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AllocationResult {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub lines: Vec<AllocatedLine>,
    pub rejected: Vec<RejectedLine>,
    pub shortage: Vec<ShortageLine>,
    pub total_shortage: i32,
    pub backorder: Option<BackorderSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AllocationLineView {
    pub product_id: Uuid,
    pub sku: String,
    pub ordered_qty: i32,
    pub allocated_qty: i32,
    pub on_hand_quantity: i32,
    pub available: i32,
    pub max_allocatable: i32,
    pub shortage: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AllocationPreview {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub editable: bool,
    pub lines: Vec<AllocationLineView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderShortageSummary {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub lines: Vec<ShortageLine>,
    pub total_shortage: i32,
}

/// Cross-order shortage for one product, for replenishment tooling.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AggregateShortageLine {
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    pub on_hand_quantity: i32,
    pub min_stock: i32,
    pub total_shortage: i32,
    pub order_count: u64,
    /// Quantity that covers every open shortage and restores `min_stock`.
    pub suggested_reorder_qty: i32,
}

/// Ordered and committed quantity of one product within one order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Demand {
    pub ordered_qty: i32,
    pub allocated_qty: i32,
}

impl Demand {
    pub fn shortage(&self) -> i32 {
        self.ordered_qty - self.allocated_qty
    }
}

/// Stock this order could hold for a product: what is free plus what the
/// order already holds.
pub fn available(on_hand_quantity: i32, current_allocated_qty: i32) -> i32 {
    on_hand_quantity + current_allocated_qty
}

pub fn max_allocatable(demand: Demand, on_hand_quantity: i32) -> i32 {
    demand
        .ordered_qty
        .min(available(on_hand_quantity, demand.allocated_qty))
        .max(0)
}

pub fn check_line(requested_qty: i32, demand: Demand, on_hand_quantity: i32) -> Result<(), RejectionReason> {
    if requested_qty < 0 {
        Err(RejectionReason::NegativeQuantity)
    } else if requested_qty > demand.ordered_qty {
        Err(RejectionReason::ExceedsOrdered)
    } else if requested_qty > available(on_hand_quantity, demand.allocated_qty) {
        Err(RejectionReason::ExceedsAvailable)
    } else {
        Ok(())
    }
}

/// Sums order items and allocation rows per product.
pub fn summarize_demand(
    items: &[order_item::Model],
    allocations: &[allocation::Model],
) -> BTreeMap<Uuid, Demand> {
    let mut demand: BTreeMap<Uuid, Demand> = BTreeMap::new();
    for item in items {
        demand.entry(item.product_id).or_default().ordered_qty += item.ordered_qty;
    }
    for row in allocations {
        if row.allocated_qty > 0 || demand.contains_key(&row.product_id) {
            demand.entry(row.product_id).or_default().allocated_qty += row.allocated_qty;
        }
    }
    demand
}

pub fn shortage_lines(demand: &BTreeMap<Uuid, Demand>) -> Vec<ShortageLine> {
    demand
        .iter()
        .map(|(product_id, d)| ShortageLine {
            product_id: *product_id,
            ordered_qty: d.ordered_qty,
            allocated_qty: d.allocated_qty,
            shortage: d.shortage(),
        })
        .collect()
}

pub(crate) async fn load_items<C>(conn: &C, order_id: Uuid) -> Result<Vec<order_item::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    OrderItemEntity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::CreatedAt)
        .order_by_asc(order_item::Column::Id)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

async fn load_allocations<C>(conn: &C, order_id: Uuid) -> Result<Vec<allocation::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    AllocationEntity::find()
        .filter(allocation::Column::OrderId.eq(order_id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

pub(crate) async fn load_demand<C>(conn: &C, order_id: Uuid) -> Result<BTreeMap<Uuid, Demand>, ServiceError>
where
    C: ConnectionTrait,
{
    let items = load_items(conn, order_id).await?;
    let allocations = load_allocations(conn, order_id).await?;
    Ok(summarize_demand(&items, &allocations))
}

/// Sum of `ordered_qty - allocated_qty` over the order's products.
pub(crate) async fn total_shortage<C>(conn: &C, order_id: Uuid) -> Result<i32, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(load_demand(conn, order_id)
        .await?
        .values()
        .map(|d| d.shortage().max(0))
        .sum())
}

async fn load_products<C>(
    conn: &C,
    product_ids: impl IntoIterator<Item = Uuid>,
) -> Result<HashMap<Uuid, product::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    let ids: Vec<Uuid> = product_ids.into_iter().collect();
    Ok(ProductEntity::find()
        .filter(product::Column::Id.is_in(ids))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?
        .into_iter()
        .map(|p| (p.id, p))
        .collect())
}

enum LineSource {
    Explicit(Vec<AllocationLine>),
    AutoFill,
}

/// Computes and commits per-product allocation for orders.
#[derive(Clone)]
pub struct AllocationService {
    db: Arc<DatabaseConnection>,
    order_locks: Arc<KeyedLocks>,
    product_locks: Arc<KeyedLocks>,
    event_sender: EventSender,
    auto_split_backorder: bool,
}

impl AllocationService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        order_locks: Arc<KeyedLocks>,
        product_locks: Arc<KeyedLocks>,
        event_sender: EventSender,
        auto_split_backorder: bool,
    ) -> Self {
        Self {
            db,
            order_locks,
            product_locks,
            event_sender,
            auto_split_backorder,
        }
    }

    /// Applies the requested quantities. Each valid line moves the ledger by
    /// the difference to the order's current allocation, so replaying the
    /// same request is a no-op.
    #[instrument(skip(self, lines), fields(order_id = %order_id, line_count = lines.len()))]
    pub async fn allocate(
        &self,
        order_id: Uuid,
        lines: Vec<AllocationLine>,
        split_backorder: Option<bool>,
    ) -> Result<AllocationResult, ServiceError> {
        self.run(order_id, LineSource::Explicit(lines), split_backorder)
            .await
    }

    /// Allocates `min(ordered, available)` for every product on the order.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn auto_fill(
        &self,
        order_id: Uuid,
        split_backorder: Option<bool>,
    ) -> Result<AllocationResult, ServiceError> {
        self.run(order_id, LineSource::AutoFill, split_backorder).await
    }

    async fn run(
        &self,
        order_id: Uuid,
        source: LineSource,
        split_backorder: Option<bool>,
    ) -> Result<AllocationResult, ServiceError> {
        metrics::ALLOCATION_REQUESTS.inc();
        let split = split_backorder.unwrap_or(self.auto_split_backorder);

        let _order_guard = self.order_locks.lock(order_id).await;

        let order = find_order(&*self.db, order_id).await?;
        if !order.status.is_allocation_editable() {
            warn!(order_id = %order_id, status = %order.status, "Allocation locked");
            return Err(ServiceError::IllegalTransition(format!(
                "allocation is locked while order {} is {}",
                order_id, order.status
            )));
        }

        let items = load_items(&*self.db, order_id).await?;
        let product_ids: BTreeSet<Uuid> = items.iter().map(|item| item.product_id).collect();
        let _product_guards = self.product_locks.lock_all(product_ids.iter().copied()).await;

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin allocation transaction");
            ServiceError::db_error(e)
        })?;

        let existing: HashMap<Uuid, allocation::Model> = load_allocations(&txn, order_id)
            .await?
            .into_iter()
            .map(|row| (row.product_id, row))
            .collect();
        let mut demand = summarize_demand(&items, &existing.values().cloned().collect::<Vec<_>>());
        let mut products = load_products(&txn, product_ids.iter().copied()).await?;
        let on_hand_of = |products: &HashMap<Uuid, product::Model>, id: &Uuid| {
            products.get(id).map(|p| p.on_hand_quantity).unwrap_or(0)
        };

        let lines = match source {
            LineSource::Explicit(lines) => lines,
            LineSource::AutoFill => demand
                .iter()
                .filter(|(_, d)| d.ordered_qty > 0)
                .map(|(product_id, d)| AllocationLine {
                    product_id: *product_id,
                    qty: max_allocatable(*d, on_hand_of(&products, product_id)),
                })
                .collect(),
        };

        let mut seen = HashSet::new();
        let mut rejected = Vec::new();
        let mut stock_events = Vec::new();

        for line in lines {
            let Some(current) = demand.get(&line.product_id).copied() else {
                rejected.push(RejectedLine {
                    product_id: line.product_id,
                    requested_qty: line.qty,
                    max_allocatable: 0,
                    reason: RejectionReason::NotOnOrder,
                });
                continue;
            };
            let on_hand = on_hand_of(&products, &line.product_id);
            let max = max_allocatable(current, on_hand);

            let verdict = if seen.insert(line.product_id) {
                check_line(line.qty, current, on_hand)
            } else {
                Err(RejectionReason::DuplicateLine)
            };
            if let Err(reason) = verdict {
                rejected.push(RejectedLine {
                    product_id: line.product_id,
                    requested_qty: line.qty,
                    max_allocatable: max,
                    reason,
                });
                continue;
            }

            let delta = line.qty - current.allocated_qty;
            if delta != 0 {
                match StockLedger::apply_delta(&txn, line.product_id, -delta).await {
                    Ok(updated) => {
                        stock_events.push(Event::StockAdjusted {
                            product_id: updated.id,
                            delta: -delta,
                            on_hand_quantity: updated.on_hand_quantity,
                            min_stock: updated.min_stock,
                        });
                        products.insert(updated.id, updated);
                    }
                    Err(ServiceError::InsufficientStock(_)) => {
                        rejected.push(RejectedLine {
                            product_id: line.product_id,
                            requested_qty: line.qty,
                            max_allocatable: max,
                            reason: RejectionReason::ExceedsAvailable,
                        });
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            upsert_allocation(&txn, order_id, line.product_id, line.qty, existing.get(&line.product_id))
                .await?;
            if let Some(entry) = demand.get_mut(&line.product_id) {
                entry.allocated_qty = line.qty;
            }
        }

        for line in &rejected {
            metrics::ALLOCATION_REJECTED_LINES
                .with_label_values(&[line.reason.as_ref()])
                .inc();
            warn!(
                order_id = %order_id,
                product_id = %line.product_id,
                requested_qty = line.requested_qty,
                max_allocatable = line.max_allocatable,
                reason = %line.reason,
                "Allocation line rejected"
            );
        }

        let shortage: Vec<ShortageLine> = shortage_lines(&demand)
            .into_iter()
            .filter(|line| line.shortage > 0)
            .collect();
        let total_shortage: i32 = shortage.iter().map(|line| line.shortage).sum();

        let has_backorders = OrderEntity::find()
            .filter(order::Column::ParentOrderId.eq(order_id))
            .count(&txn)
            .await
            .map_err(ServiceError::db_error)?
            > 0;
        let old_status = order.status;
        let next_status =
            order_lifecycle::status_after_allocation(old_status, total_shortage, has_backorders);
        let order = if next_status != old_status {
            order_lifecycle::apply_transition(&txn, order, next_status, TransitionCause::Allocation)
                .await?
        } else {
            order
        };

        let backorder = if split && total_shortage > 0 && order.status == OrderStatus::PartiallyFulfilled {
            Some(backorder::split(&txn, &order, &items, &shortage).await?)
        } else {
            None
        };

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit allocation");
            ServiceError::db_error(e)
        })?;

        let lines: Vec<AllocatedLine> = demand
            .iter()
            .map(|(product_id, d)| AllocatedLine {
                product_id: *product_id,
                allocated_qty: d.allocated_qty,
            })
            .collect();
        let total_allocated: i32 = lines.iter().map(|line| line.allocated_qty).sum();

        info!(
            order_id = %order_id,
            total_allocated,
            total_shortage,
            rejected = rejected.len(),
            status = %order.status,
            "Allocation saved"
        );

        for event in stock_events {
            self.event_sender.send_or_log(event).await;
        }
        self.event_sender
            .send_or_log(Event::OrderAllocated {
                order_id,
                total_allocated,
                total_shortage,
            })
            .await;
        if order.status != old_status {
            self.event_sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id,
                    old_status,
                    new_status: order.status,
                })
                .await;
        }
        if let Some(summary) = &backorder {
            metrics::BACKORDERS_CREATED.inc();
            self.event_sender
                .send_or_log(Event::BackorderCreated {
                    parent_order_id: order_id,
                    backorder_id: summary.backorder_id,
                    shortage_qty: summary.shortage_qty,
                })
                .await;
        }

        Ok(AllocationResult {
            order_id,
            status: order.status,
            lines,
            rejected,
            shortage,
            total_shortage,
            backorder,
        })
    }

    /// Per-product availability for an order, as shown to operators before
    /// they allocate.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn preview(&self, order_id: Uuid) -> Result<AllocationPreview, ServiceError> {
        let db = &*self.db;
        let order = find_order(db, order_id).await?;
        let demand = load_demand(db, order_id).await?;
        let products = load_products(db, demand.keys().copied()).await?;

        let lines = demand
            .iter()
            .map(|(product_id, d)| {
                let (sku, on_hand) = products
                    .get(product_id)
                    .map(|p| (p.sku.clone(), p.on_hand_quantity))
                    .unwrap_or_default();
                AllocationLineView {
                    product_id: *product_id,
                    sku,
                    ordered_qty: d.ordered_qty,
                    allocated_qty: d.allocated_qty,
                    on_hand_quantity: on_hand,
                    available: available(on_hand, d.allocated_qty),
                    max_allocatable: max_allocatable(*d, on_hand),
                    shortage: d.shortage(),
                }
            })
            .collect();

        Ok(AllocationPreview {
            order_id,
            status: order.status,
            editable: order.status.is_allocation_editable(),
            lines,
        })
    }

    /// Ordered, allocated and shortage per product for one order.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn shortage_summary(&self, order_id: Uuid) -> Result<OrderShortageSummary, ServiceError> {
        let db = &*self.db;
        let order = find_order(db, order_id).await?;
        let lines = shortage_lines(&load_demand(db, order_id).await?);
        let total_shortage: i32 = lines.iter().map(|line| line.shortage.max(0)).sum();

        Ok(OrderShortageSummary {
            order_id,
            status: order.status,
            lines,
            total_shortage,
        })
    }

    /// Outstanding shortage per product across every order that can still
    /// receive allocation.
    #[instrument(skip(self))]
    pub async fn aggregate_shortages(&self) -> Result<Vec<AggregateShortageLine>, ServiceError> {
        let db = &*self.db;
        let open_statuses: Vec<OrderStatus> = OrderStatus::iter()
            .filter(|status| status.is_allocation_editable())
            .collect();
        let order_ids: Vec<Uuid> = OrderEntity::find()
            .filter(order::Column::Status.is_in(open_statuses))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|o| o.id)
            .collect();

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.is_in(order_ids.clone()))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;
        let allocations = AllocationEntity::find()
            .filter(allocation::Column::OrderId.is_in(order_ids))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut items_by_order: HashMap<Uuid, Vec<order_item::Model>> = HashMap::new();
        for item in items {
            items_by_order.entry(item.order_id).or_default().push(item);
        }
        let mut allocations_by_order: HashMap<Uuid, Vec<allocation::Model>> = HashMap::new();
        for row in allocations {
            allocations_by_order.entry(row.order_id).or_default().push(row);
        }

        // product -> (total shortage, orders short)
        let mut totals: BTreeMap<Uuid, (i32, u64)> = BTreeMap::new();
        for (order_id, items) in &items_by_order {
            let rows = allocations_by_order
                .get(order_id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for (product_id, d) in summarize_demand(items, rows) {
                if d.shortage() > 0 {
                    let entry = totals.entry(product_id).or_default();
                    entry.0 += d.shortage();
                    entry.1 += 1;
                }
            }
        }

        let products = load_products(db, totals.keys().copied()).await?;
        let mut lines: Vec<AggregateShortageLine> = totals
            .into_iter()
            .map(|(product_id, (total_shortage, order_count))| {
                let product = products.get(&product_id);
                let on_hand_quantity = product.map(|p| p.on_hand_quantity).unwrap_or(0);
                let min_stock = product.map(|p| p.min_stock).unwrap_or(0);
                AggregateShortageLine {
                    product_id,
                    sku: product.map(|p| p.sku.clone()).unwrap_or_default(),
                    name: product.map(|p| p.name.clone()).unwrap_or_default(),
                    on_hand_quantity,
                    min_stock,
                    total_shortage,
                    order_count,
                    suggested_reorder_qty: (total_shortage + min_stock - on_hand_quantity).max(0),
                }
            })
            .collect();
        lines.sort_by(|a, b| {
            b.total_shortage
                .cmp(&a.total_shortage)
                .then(a.product_id.cmp(&b.product_id))
        });

        Ok(lines)
    }
}

async fn upsert_allocation<C>(
    conn: &C,
    order_id: Uuid,
    product_id: Uuid,
    qty: i32,
    existing: Option<&allocation::Model>,
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    match existing {
        Some(row) if row.allocated_qty == qty => Ok(()),
        Some(row) => {
            let mut active: allocation::ActiveModel = row.clone().into();
            active.allocated_qty = Set(qty);
            active.update(conn).await.map_err(ServiceError::db_error)?;
            Ok(())
        }
        None => {
            allocation::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product_id),
                allocated_qty: Set(qty),
                ..Default::default()
            }
            .insert(conn)
            .await
            .map_err(ServiceError::db_error)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn demand(ordered_qty: i32, allocated_qty: i32) -> Demand {
        Demand {
            ordered_qty,
            allocated_qty,
        }
    }

    #[test]
    fn availability_adds_back_own_allocation_only() {
        assert_eq!(available(5, 3), 8);
        assert_eq!(max_allocatable(demand(10, 3), 5), 8);
        assert_eq!(max_allocatable(demand(6, 3), 5), 6);
        assert_eq!(max_allocatable(demand(4, 0), 0), 0);
    }

    #[rstest]
    #[case(7, demand(10, 3), 5, Ok(()))]
    #[case(8, demand(10, 3), 5, Ok(()))]
    #[case(9, demand(10, 3), 5, Err(RejectionReason::ExceedsAvailable))]
    #[case(11, demand(10, 0), 50, Err(RejectionReason::ExceedsOrdered))]
    #[case(-1, demand(10, 0), 50, Err(RejectionReason::NegativeQuantity))]
    #[case(0, demand(10, 4), 0, Ok(()))]
    fn line_validation(
        #[case] requested: i32,
        #[case] current: Demand,
        #[case] on_hand: i32,
        #[case] expected: Result<(), RejectionReason>,
    ) {
        assert_eq!(check_line(requested, current, on_hand), expected);
    }

    fn item(order_id: Uuid, product_id: Uuid, qty: i32) -> order_item::Model {
        order_item::Model {
            id: Uuid::new_v4(),
            order_id,
            product_id,
            ordered_qty: qty,
            unit_price_at_purchase: dec!(12.50),
            created_at: Utc::now(),
        }
    }

    fn row(order_id: Uuid, product_id: Uuid, qty: i32) -> allocation::Model {
        allocation::Model {
            id: Uuid::new_v4(),
            order_id,
            product_id,
            allocated_qty: qty,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn demand_sums_duplicate_items() {
        let order_id = Uuid::new_v4();
        let p = Uuid::new_v4();
        let q = Uuid::new_v4();
        let items = vec![item(order_id, p, 4), item(order_id, p, 6), item(order_id, q, 1)];
        let rows = vec![row(order_id, p, 7)];

        let summary = summarize_demand(&items, &rows);
        assert_eq!(summary[&p], demand(10, 7));
        assert_eq!(summary[&q], demand(1, 0));

        let lines = shortage_lines(&summary);
        let short: i32 = lines.iter().map(|l| l.shortage).sum();
        assert_eq!(short, 4);
    }

    #[test]
    fn zero_allocation_rows_without_items_are_ignored() {
        let order_id = Uuid::new_v4();
        let gone = Uuid::new_v4();
        let summary = summarize_demand(&[], &[row(order_id, gone, 0)]);
        assert!(summary.is_empty());
    }

    #[test]
    fn rejection_reasons_render_snake_case() {
        assert_eq!(RejectionReason::ExceedsAvailable.as_ref(), "exceeds_available");
        assert_eq!(
            serde_json::to_value(RejectionReason::NotOnOrder).unwrap(),
            serde_json::json!("not_on_order")
        );
    }
}
