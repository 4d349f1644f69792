use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    TransactionTrait,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::product::{self, Entity as ProductEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
};

/// Registry of async mutexes keyed by entity id.
///
/// Holders of several guards must take them in ascending key order;
/// [`KeyedLocks::lock_all`] does that for them. An entry lives only while
/// some caller holds or waits on its mutex.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    inner: DashMap<Uuid, Arc<Mutex<()>>>,
}

/// Guard for one key. Dropping the last holder removes the key's entry.
#[derive(Debug)]
pub struct KeyGuard<'a> {
    locks: &'a KeyedLocks,
    key: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters and new callers clone the Arc under the shard lock, so a
        // count of one means the map holds the only reference.
        self.locks
            .inner
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, key: Uuid) -> Arc<Mutex<()>> {
        self.inner
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn lock(&self, key: Uuid) -> KeyGuard<'_> {
        let guard = self.handle(key).lock_owned().await;
        KeyGuard {
            locks: self,
            key,
            guard: Some(guard),
        }
    }

    /// Locks every distinct key, smallest first.
    pub async fn lock_all<I>(&self, keys: I) -> Vec<KeyGuard<'_>>
    where
        I: IntoIterator<Item = Uuid>,
    {
        let ordered: BTreeSet<Uuid> = keys.into_iter().collect();
        let mut guards = Vec::with_capacity(ordered.len());
        for key in ordered {
            guards.push(self.lock(key).await);
        }
        guards
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Owner of `products.on_hand_quantity`.
#[derive(Clone)]
pub struct StockLedger {
    db: Arc<DatabaseConnection>,
    product_locks: Arc<KeyedLocks>,
    event_sender: EventSender,
}

impl StockLedger {
    pub fn new(
        db: Arc<DatabaseConnection>,
        product_locks: Arc<KeyedLocks>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            product_locks,
            event_sender,
        }
    }

    /// Current free quantity of a product.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn get_available(&self, product_id: Uuid) -> Result<i32, ServiceError> {
        Ok(self.get_stock(product_id).await?.on_hand_quantity)
    }

    pub async fn get_stock(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        ProductEntity::find_by_id(product_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::product_not_found(product_id))
    }

    /// Adds `delta` to `on_hand_quantity` with a single conditional update.
    ///
    /// Nothing changes when the result would be negative. The caller owns the
    /// transaction (shared with its allocation write) and the product lock.
    pub async fn apply_delta<C>(
        conn: &C,
        product_id: Uuid,
        delta: i32,
    ) -> Result<product::Model, ServiceError>
    where
        C: ConnectionTrait,
    {
        if delta != 0 {
            let result = ProductEntity::update_many()
                .col_expr(
                    product::Column::OnHandQuantity,
                    Expr::col(product::Column::OnHandQuantity).add(delta),
                )
                .col_expr(
                    product::Column::UpdatedAt,
                    Expr::value(chrono::Utc::now()),
                )
                .filter(product::Column::Id.eq(product_id))
                .filter(product::Column::OnHandQuantity.gte(-delta))
                .exec(conn)
                .await
                .map_err(ServiceError::db_error)?;

            if result.rows_affected == 0 {
                let current = ProductEntity::find_by_id(product_id)
                    .one(conn)
                    .await
                    .map_err(ServiceError::db_error)?
                    .ok_or_else(|| ServiceError::product_not_found(product_id))?;
                metrics::STOCK_DELTA_FAILURES.inc();
                warn!(
                    product_id = %product_id,
                    delta,
                    on_hand_quantity = current.on_hand_quantity,
                    "Stock delta refused"
                );
                return Err(ServiceError::InsufficientStock(format!(
                    "product {} has {} on hand, cannot apply {}",
                    product_id, current.on_hand_quantity, delta
                )));
            }
        }

        ProductEntity::find_by_id(product_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::product_not_found(product_id))
    }

    /// Restocks a product.
    #[instrument(skip(self), fields(product_id = %product_id, quantity))]
    pub async fn receive_stock(
        &self,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<product::Model, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "received quantity must be greater than 0".to_string(),
            ));
        }

        let _guard = self.product_locks.lock(product_id).await;

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin stock receipt transaction");
            ServiceError::db_error(e)
        })?;
        let updated = Self::apply_delta(&txn, product_id, quantity).await?;
        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit stock receipt");
            ServiceError::db_error(e)
        })?;

        info!(
            product_id = %product_id,
            quantity,
            on_hand_quantity = updated.on_hand_quantity,
            "Stock received"
        );
        self.event_sender
            .send_or_log(Event::StockAdjusted {
                product_id,
                delta: quantity,
                on_hand_quantity: updated.on_hand_quantity,
                min_stock: updated.min_stock,
            })
            .await;

        Ok(updated)
    }
}
