use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, ModelTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{
        order::{self, Entity as OrderEntity, OrderStatus},
        order_item,
    },
    errors::ServiceError,
    services::{
        allocation::{load_demand, shortage_lines, ShortageLine},
        order_lifecycle::find_order,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BackorderLine {
    pub product_id: Uuid,
    pub qty: i32,
    pub unit_price_at_purchase: Decimal,
}

/// The child order created by a split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BackorderSummary {
    pub backorder_id: Uuid,
    pub order_number: String,
    pub parent_order_id: Uuid,
    pub lines: Vec<BackorderLine>,
    pub shortage_qty: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BackorderView {
    pub order_id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub cancel_reason: Option<String>,
    pub lines: Vec<ShortageLine>,
    pub total_shortage: i32,
}

/// Piece of a parent item moved to the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovedQty {
    pub item_index: usize,
    pub qty: i32,
}

/// Picks how much to take from each item of one product so that exactly
/// `shortage` units leave the parent. Newest items are drained first.
pub fn plan_moves(items: &[order_item::Model], product_id: Uuid, shortage: i32) -> Vec<MovedQty> {
    let mut remaining = shortage;
    let mut moves = Vec::new();
    for (item_index, item) in items.iter().enumerate().rev() {
        if remaining <= 0 {
            break;
        }
        if item.product_id != product_id || item.ordered_qty <= 0 {
            continue;
        }
        let qty = remaining.min(item.ordered_qty);
        moves.push(MovedQty { item_index, qty });
        remaining -= qty;
    }
    moves
}

pub fn backorder_number(parent_number: &str, sequence: u64) -> String {
    format!("{}-BO{}", parent_number, sequence)
}

/// Moves the shortfall of `parent` into a new pending child order.
///
/// Parent items shrink to the committed quantity (items left at zero are
/// removed); the child receives one item per moved piece at the original
/// unit price.
pub(crate) async fn split<C>(
    conn: &C,
    parent: &order::Model,
    items: &[order_item::Model],
    shortages: &[ShortageLine],
) -> Result<BackorderSummary, ServiceError>
where
    C: ConnectionTrait,
{
    let sequence = OrderEntity::find()
        .filter(order::Column::ParentOrderId.eq(parent.id))
        .count(conn)
        .await
        .map_err(ServiceError::db_error)?
        + 1;

    let child = order::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_number: Set(backorder_number(&parent.order_number, sequence)),
        customer_id: Set(parent.customer_id),
        status: Set(OrderStatus::Pending),
        parent_order_id: Set(Some(parent.id)),
        courier_id: Set(None),
        cancel_reason: Set(None),
        canceled_at: Set(None),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)?;

    let mut lines: Vec<BackorderLine> = Vec::new();
    for shortage in shortages.iter().filter(|s| s.shortage > 0) {
        for moved in plan_moves(items, shortage.product_id, shortage.shortage) {
            let item = &items[moved.item_index];

            if moved.qty == item.ordered_qty {
                item.clone()
                    .delete(conn)
                    .await
                    .map_err(ServiceError::db_error)?;
            } else {
                let mut active: order_item::ActiveModel = item.clone().into();
                active.ordered_qty = Set(item.ordered_qty - moved.qty);
                active.update(conn).await.map_err(ServiceError::db_error)?;
            }

            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(child.id),
                product_id: Set(item.product_id),
                ordered_qty: Set(moved.qty),
                unit_price_at_purchase: Set(item.unit_price_at_purchase),
                created_at: Set(Utc::now()),
            }
            .insert(conn)
            .await
            .map_err(ServiceError::db_error)?;

            match lines.iter_mut().find(|l| {
                l.product_id == item.product_id
                    && l.unit_price_at_purchase == item.unit_price_at_purchase
            }) {
                Some(line) => line.qty += moved.qty,
                None => lines.push(BackorderLine {
                    product_id: item.product_id,
                    qty: moved.qty,
                    unit_price_at_purchase: item.unit_price_at_purchase,
                }),
            }
        }
    }

    let shortage_qty: i32 = lines.iter().map(|l| l.qty).sum();
    info!(
        parent_order_id = %parent.id,
        backorder_id = %child.id,
        order_number = %child.order_number,
        shortage_qty,
        "Backorder split"
    );

    Ok(BackorderSummary {
        backorder_id: child.id,
        order_number: child.order_number,
        parent_order_id: parent.id,
        lines,
        shortage_qty,
    })
}

/// Read side of parent/child order linkage.
#[derive(Clone)]
pub struct BackorderService {
    db: Arc<DatabaseConnection>,
}

impl BackorderService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Children of an order, oldest first.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn list_backorders(&self, order_id: Uuid) -> Result<Vec<BackorderView>, ServiceError> {
        let db = &*self.db;
        find_order(db, order_id).await?;

        let children = OrderEntity::find()
            .filter(order::Column::ParentOrderId.eq(order_id))
            .order_by_asc(order::Column::CreatedAt)
            .order_by_asc(order::Column::OrderNumber)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut views = Vec::with_capacity(children.len());
        for child in children {
            let lines = shortage_lines(&load_demand(db, child.id).await?);
            let total_shortage: i32 = lines.iter().map(|l| l.shortage.max(0)).sum();
            views.push(BackorderView {
                order_id: child.id,
                order_number: child.order_number,
                status: child.status,
                created_at: child.created_at,
                cancel_reason: child.cancel_reason,
                lines,
                total_shortage,
            });
        }
        Ok(views)
    }
}
