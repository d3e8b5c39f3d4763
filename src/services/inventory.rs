use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::{
    stock_adjustment, stock_item, AdjustmentReason, AdjustmentSource,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Attempts for the conditional quantity update before giving up. Under
/// read-committed isolation a lost race re-reads the winner's committed
/// count and retries.
const CAS_ATTEMPTS: u32 = 5;

/// Who and why for a ledger entry.
#[derive(Debug, Clone)]
pub struct AdjustmentContext {
    pub reason: AdjustmentReason,
    pub source: AdjustmentSource,
    pub adjusted_by: String,
    pub note: Option<String>,
}

/// Intake payload for a new stock item.
#[derive(Debug, Clone)]
pub struct NewStockItem {
    pub name: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub platform_item_id: Option<String>,
    pub initial_quantity: i32,
    pub low_stock_threshold: i32,
    pub price: Decimal,
}

/// The canonical stock store plus its append-only adjustment ledger.
///
/// Quantity moves only through `apply_delta` / `set_authoritative`; both
/// couple the count mutation and the ledger write into one transaction.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    pub async fn get_item(&self, id: Uuid) -> Result<stock_item::Model, ServiceError> {
        stock_item::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Stock item {} not found", id)))
    }

    pub async fn get_quantity(&self, id: Uuid) -> Result<i32, ServiceError> {
        Ok(self.get_item(id).await?.quantity)
    }

    /// Moves quantity by a signed delta in its own transaction.
    #[instrument(skip(self, ctx), fields(reason = %ctx.reason, source = %ctx.source))]
    pub async fn apply_delta(
        &self,
        id: Uuid,
        delta: i32,
        ctx: AdjustmentContext,
    ) -> Result<stock_adjustment::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let entry = Self::apply_delta_on(&txn, id, delta, &ctx).await?;
        txn.commit().await?;

        self.notify_adjusted(id, ctx.source, entry.new_quantity).await;
        Ok(entry)
    }

    /// Delta application against a caller-supplied connection, so the sale
    /// coordinator can bundle several deltas and an order insert into one
    /// transaction.
    ///
    /// The count is moved with a conditional update (`WHERE quantity =
    /// previous`); a zero-row result means another writer got there first
    /// and the read-compute-update cycle is retried. The new value is never
    /// computed once and blindly written back.
    pub(crate) async fn apply_delta_on<C: ConnectionTrait>(
        conn: &C,
        id: Uuid,
        delta: i32,
        ctx: &AdjustmentContext,
    ) -> Result<stock_adjustment::Model, ServiceError> {
        if delta == 0 {
            return Err(ServiceError::ValidationError(
                "Adjustment delta must be non-zero".to_string(),
            ));
        }

        for _ in 0..CAS_ATTEMPTS {
            let item = stock_item::Entity::find_by_id(id)
                .one(conn)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Stock item {} not found", id)))?;

            let previous = item.quantity;
            let next = previous + delta;
            if next < 0 {
                return Err(ServiceError::InsufficientStock(format!(
                    "{}: {} on hand, requested {}",
                    item.name, previous, -delta
                )));
            }

            let result = stock_item::Entity::update_many()
                .col_expr(stock_item::Column::Quantity, Expr::value(next))
                .col_expr(stock_item::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(stock_item::Column::Id.eq(id))
                .filter(stock_item::Column::Quantity.eq(previous))
                .exec(conn)
                .await?;

            if result.rows_affected == 0 {
                continue; // lost the race, re-read and retry
            }

            let entry = stock_adjustment::ActiveModel {
                id: Set(Uuid::new_v4()),
                stock_item_id: Set(id),
                quantity_delta: Set(delta),
                reason: Set(ctx.reason),
                previous_quantity: Set(previous),
                new_quantity: Set(next),
                source: Set(ctx.source),
                adjusted_by: Set(ctx.adjusted_by.clone()),
                note: Set(ctx.note.clone()),
                created_at: Set(Utc::now()),
            }
            .insert(conn)
            .await?;

            return Ok(entry);
        }

        Err(ServiceError::ConcurrentModification(id))
    }

    /// Sets an absolute count from an authoritative source (external sync
    /// or reconciliation audit). The jump is ledgered with before/after;
    /// re-applying the current count is a no-op and writes nothing.
    #[instrument(skip(self, ctx), fields(source = %ctx.source))]
    pub async fn set_authoritative(
        &self,
        id: Uuid,
        new_quantity: i32,
        ctx: AdjustmentContext,
    ) -> Result<Option<stock_adjustment::Model>, ServiceError> {
        if !ctx.source.is_authoritative() {
            return Err(ServiceError::ValidationError(format!(
                "Source {} may not set absolute quantities; apply a delta instead",
                ctx.source
            )));
        }
        if new_quantity < 0 {
            return Err(ServiceError::ValidationError(
                "Authoritative quantity must be non-negative".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let mut entry = None;
        for _ in 0..CAS_ATTEMPTS {
            let item = stock_item::Entity::find_by_id(id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Stock item {} not found", id)))?;

            let previous = item.quantity;
            if previous == new_quantity {
                txn.commit().await?;
                return Ok(None);
            }

            let result = stock_item::Entity::update_many()
                .col_expr(stock_item::Column::Quantity, Expr::value(new_quantity))
                .col_expr(stock_item::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(stock_item::Column::Id.eq(id))
                .filter(stock_item::Column::Quantity.eq(previous))
                .exec(&txn)
                .await?;

            if result.rows_affected == 0 {
                continue;
            }

            entry = Some(
                stock_adjustment::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    stock_item_id: Set(id),
                    quantity_delta: Set(new_quantity - previous),
                    reason: Set(ctx.reason),
                    previous_quantity: Set(previous),
                    new_quantity: Set(new_quantity),
                    source: Set(ctx.source),
                    adjusted_by: Set(ctx.adjusted_by.clone()),
                    note: Set(ctx.note.clone()),
                    created_at: Set(Utc::now()),
                }
                .insert(&txn)
                .await?,
            );
            break;
        }

        let Some(entry) = entry else {
            return Err(ServiceError::ConcurrentModification(id));
        };

        txn.commit().await?;
        info!(
            stock_item_id = %id,
            previous = entry.previous_quantity,
            new = entry.new_quantity,
            "Authoritative count applied"
        );

        self.notify_adjusted(id, ctx.source, new_quantity).await;
        Ok(Some(entry))
    }

    /// Creates a stock item. A nonzero opening count goes through the
    /// ledger as a restock so replay-from-zero stays exact.
    #[instrument(skip(self, new_item), fields(name = %new_item.name))]
    pub async fn create_item(
        &self,
        new_item: NewStockItem,
        actor: &str,
    ) -> Result<stock_item::Model, ServiceError> {
        if new_item.initial_quantity < 0 {
            return Err(ServiceError::ValidationError(
                "Initial quantity must be non-negative".to_string(),
            ));
        }
        if new_item.name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Item name is required".to_string(),
            ));
        }

        let now = Utc::now();
        let id = Uuid::new_v4();

        let txn = self.db.begin().await?;

        let item = stock_item::ActiveModel {
            id: Set(id),
            name: Set(new_item.name),
            sku: Set(new_item.sku),
            barcode: Set(new_item.barcode),
            platform_item_id: Set(new_item.platform_item_id),
            quantity: Set(0),
            low_stock_threshold: Set(new_item.low_stock_threshold),
            price: Set(new_item.price),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        if new_item.initial_quantity > 0 {
            let ctx = AdjustmentContext {
                reason: AdjustmentReason::Restocked,
                source: AdjustmentSource::Admin,
                adjusted_by: actor.to_string(),
                note: Some("initial intake".to_string()),
            };
            Self::apply_delta_on(&txn, id, new_item.initial_quantity, &ctx).await?;
        }

        txn.commit().await?;
        info!(stock_item_id = %id, "Stock item created");

        // re-read so the returned model carries the opening quantity
        self.get_item(id).await.or(Ok(item))
    }

    /// Deactivates instead of deleting; historical orders keep referencing
    /// the row.
    pub async fn deactivate_item(&self, id: Uuid) -> Result<(), ServiceError> {
        let item = self.get_item(id).await?;
        let mut active: stock_item::ActiveModel = item.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;
        Ok(())
    }

    /// Stores the platform's identifier on the local record after a first
    /// SKU/barcode match, making later syncs deterministic.
    pub async fn link_platform_item(
        &self,
        id: Uuid,
        platform_item_id: &str,
    ) -> Result<(), ServiceError> {
        let item = self.get_item(id).await?;
        let mut active: stock_item::ActiveModel = item.into();
        active.platform_item_id = Set(Some(platform_item_id.to_string()));
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;
        Ok(())
    }

    pub async fn list_items(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<stock_item::Model>, u64), ServiceError> {
        let paginator = stock_item::Entity::find()
            .order_by_asc(stock_item::Column::Name)
            .paginate(&*self.db, limit.max(1));
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    pub async fn low_stock_items(&self) -> Result<Vec<stock_item::Model>, ServiceError> {
        let items = stock_item::Entity::find()
            .filter(stock_item::Column::IsActive.eq(true))
            .filter(
                Expr::col(stock_item::Column::Quantity)
                    .lte(Expr::col(stock_item::Column::LowStockThreshold)),
            )
            .order_by_asc(stock_item::Column::Quantity)
            .all(&*self.db)
            .await?;
        Ok(items)
    }

    /// Full ledger for one item, oldest first. This is the audit view: the
    /// entries replayed in order must land on the current quantity.
    pub async fn item_history(
        &self,
        id: Uuid,
    ) -> Result<Vec<stock_adjustment::Model>, ServiceError> {
        let entries = stock_adjustment::Entity::find()
            .filter(stock_adjustment::Column::StockItemId.eq(id))
            .order_by_asc(stock_adjustment::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(entries)
    }

    /// Ledger entries after a timestamp, across all items, for
    /// reconciliation reporting.
    pub async fn entries_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<stock_adjustment::Model>, ServiceError> {
        let entries = stock_adjustment::Entity::find()
            .filter(stock_adjustment::Column::CreatedAt.gt(since))
            .order_by_asc(stock_adjustment::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(entries)
    }

    /// Folds the item's ledger from zero. Equal to the stored quantity
    /// whenever the ledger invariant holds.
    pub async fn replayed_quantity(&self, id: Uuid) -> Result<i32, ServiceError> {
        let entries = self.item_history(id).await?;
        Ok(entries.iter().map(|e| e.quantity_delta).sum())
    }

    async fn notify_adjusted(&self, id: Uuid, source: AdjustmentSource, new_quantity: i32) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::StockAdjusted {
                    stock_item_id: id,
                    source,
                    new_quantity,
                })
                .await
            {
                warn!(stock_item_id = %id, error = %e, "Failed to send stock adjusted event");
            }
        }
    }
}
