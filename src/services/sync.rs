use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::entities::{
    stock_item, sync_checkpoint, AdjustmentReason, AdjustmentSource, Channel,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::platform::{PlatformClient, PlatformItem, PlatformItemUpsert};
use crate::services::inventory::{AdjustmentContext, InventoryService};
use crate::services::sales::{SaleCoordinator, SaleLine, SaleRequest, SaleTotals};

const CHECKPOINT_ID: i32 = 1;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Per-pass reconciliation counters. One platform item lands in exactly one
/// of matched+changed (`updated`), created, or skipped; failures append to
/// `errors` without aborting the pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncTally {
    pub total: i32,
    pub matched: i32,
    pub created: i32,
    pub updated: i32,
    pub skipped: i32,
    pub errors: Vec<String>,
}

impl SyncTally {
    pub fn merge(&mut self, other: SyncTally) {
        self.total += other.total;
        self.matched += other.matched;
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
    }
}

/// Outcome of ingesting a platform-side order event.
#[derive(Debug)]
pub enum OrderIngest {
    /// The order was already on the ledger; nothing was written.
    AlreadyRecorded(Uuid),
    Recorded(Uuid),
    /// The order could not be recorded for a reason redelivery will not
    /// fix; the message says why.
    Skipped(String),
}

/// A matched item whose local and platform counts currently disagree.
#[derive(Debug, Serialize)]
pub struct CountMismatch {
    pub stock_item_id: Uuid,
    pub name: String,
    pub local_quantity: i32,
    pub platform_quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct SyncStatus {
    pub connected: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_tally: Option<sync_checkpoint::Model>,
    pub mismatches: Vec<CountMismatch>,
}

/// Bidirectional reconciliation against the external platform.
///
/// Pull treats the platform's count as authoritative for matched items and
/// writes corrections through the ledger; push mirrors the local catalog
/// outward. Neither direction ever invents local stock items from platform
/// data.
pub struct ChannelSyncService {
    db: Arc<DatabaseConnection>,
    inventory: InventoryService,
    sales: SaleCoordinator,
    platform: Arc<dyn PlatformClient>,
    retries: u32,
    event_sender: Option<EventSender>,
}

impl ChannelSyncService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        inventory: InventoryService,
        sales: SaleCoordinator,
        platform: Arc<dyn PlatformClient>,
        retries: u32,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            db,
            inventory,
            sales,
            platform,
            retries: retries.max(1),
            event_sender,
        }
    }

    /// Pulls the platform catalog and corrects local counts where they
    /// diverge. Items the platform knows but the store does not are
    /// skipped, never created.
    #[instrument(skip(self))]
    pub async fn pull(&self) -> Result<SyncTally, ServiceError> {
        let platform = Arc::clone(&self.platform);
        let items = with_retry(self.retries, "list platform items", move || {
            let platform = Arc::clone(&platform);
            async move { platform.list_items().await }
        })
        .await?;

        let mut tally = SyncTally::default();
        tally.total = items.len() as i32;

        for item in &items {
            match self.pull_one(item).await {
                Ok(outcome) => match outcome {
                    PullOutcome::Corrected => {
                        tally.matched += 1;
                        tally.updated += 1;
                    }
                    PullOutcome::Unchanged => {
                        tally.matched += 1;
                        tally.skipped += 1;
                    }
                    PullOutcome::NoMatch => tally.skipped += 1,
                },
                Err(e) => {
                    error!(platform_item_id = %item.id, error = %e, "Pull failed for item");
                    tally.errors.push(format!("{}: {}", item.id, e));
                }
            }
        }

        info!(
            total = tally.total,
            matched = tally.matched,
            updated = tally.updated,
            skipped = tally.skipped,
            errors = tally.errors.len(),
            "Pull pass finished"
        );
        self.save_checkpoint(&tally).await;
        Ok(tally)
    }

    async fn pull_one(&self, platform_item: &PlatformItem) -> Result<PullOutcome, ServiceError> {
        let Some(local) = self.find_match(platform_item).await? else {
            info!(
                platform_item_id = %platform_item.id,
                name = %platform_item.name,
                "Platform item has no local counterpart; skipping"
            );
            return Ok(PullOutcome::NoMatch);
        };

        // First match by SKU/barcode stores the platform id so the next
        // pass matches deterministically.
        if local.platform_item_id.as_deref() != Some(platform_item.id.as_str()) {
            self.inventory
                .link_platform_item(local.id, &platform_item.id)
                .await?;
        }

        if local.quantity == platform_item.stock_count {
            return Ok(PullOutcome::Unchanged);
        }

        let reason = if platform_item.stock_count < local.quantity {
            AdjustmentReason::SoldByPlatform
        } else {
            AdjustmentReason::Restocked
        };
        let ctx = AdjustmentContext {
            reason,
            source: AdjustmentSource::PlatformSync,
            adjusted_by: "platform_sync".to_string(),
            note: Some(format!("pull from platform item {}", platform_item.id)),
        };
        self.inventory
            .set_authoritative(local.id, platform_item.stock_count, ctx)
            .await?;
        Ok(PullOutcome::Corrected)
    }

    /// Pushes the local catalog to the platform: updates linked items,
    /// creates unlinked ones and stores the new link. Local quantities are
    /// never mutated here.
    #[instrument(skip(self))]
    pub async fn push(&self) -> Result<SyncTally, ServiceError> {
        let items = stock_item::Entity::find()
            .filter(stock_item::Column::IsActive.eq(true))
            .all(&*self.db)
            .await?;

        let mut tally = SyncTally::default();
        tally.total = items.len() as i32;

        for item in items {
            match self.push_one(&item).await {
                Ok(created) => {
                    tally.matched += 1;
                    if created {
                        tally.created += 1;
                    } else {
                        tally.updated += 1;
                    }
                }
                Err(e) => {
                    error!(stock_item_id = %item.id, error = %e, "Push failed for item");
                    tally.errors.push(format!("{}: {}", item.name, e));
                }
            }
        }

        info!(
            total = tally.total,
            created = tally.created,
            updated = tally.updated,
            errors = tally.errors.len(),
            "Push pass finished"
        );
        Ok(tally)
    }

    /// Returns true when the item had to be created on the platform.
    async fn push_one(&self, item: &stock_item::Model) -> Result<bool, ServiceError> {
        let upsert = PlatformItemUpsert {
            name: item.name.clone(),
            price: item.price,
            sku: item.sku.clone(),
            barcode: item.barcode.clone(),
            hidden: !item.is_active,
        };

        if let Some(platform_id) = item.platform_item_id.as_deref() {
            self.platform.update_item(platform_id, &upsert).await?;
            self.platform.update_stock(platform_id, item.quantity).await?;
            Ok(false)
        } else {
            let created = self.platform.create_item(&upsert).await?;
            self.inventory.link_platform_item(item.id, &created.id).await?;
            self.platform.update_stock(&created.id, item.quantity).await?;
            Ok(true)
        }
    }

    /// Pull then push. A failed phase is recorded in the tally; the other
    /// phase still runs.
    #[instrument(skip(self))]
    pub async fn full_sync(&self) -> Result<SyncTally, ServiceError> {
        let mut tally = SyncTally::default();

        match self.pull().await {
            Ok(t) => tally.merge(t),
            Err(e) => {
                error!(error = %e, "Pull phase failed");
                tally.errors.push(format!("pull: {}", e));
            }
        }
        match self.push().await {
            Ok(t) => tally.merge(t),
            Err(e) => {
                error!(error = %e, "Push phase failed");
                tally.errors.push(format!("push: {}", e));
            }
        }

        self.save_checkpoint(&tally).await;

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::SyncCompleted {
                    matched: tally.matched,
                    updated: tally.updated,
                    skipped: tally.skipped,
                    errors: tally.errors.len(),
                })
                .await
            {
                warn!(error = %e, "Failed to send sync completed event");
            }
        }

        Ok(tally)
    }

    /// Reacts to an `inventory.updated` event by re-fetching that one item
    /// from the platform and reconciling it. The event payload's id is a
    /// pointer, never a count to apply.
    #[instrument(skip(self))]
    pub async fn handle_inventory_event(&self, platform_item_id: &str) -> SyncTally {
        let mut tally = SyncTally::default();
        tally.total = 1;

        let platform = Arc::clone(&self.platform);
        let id = platform_item_id.to_string();
        let fetched = with_retry(self.retries, "fetch platform item", move || {
            let platform = Arc::clone(&platform);
            let id = id.clone();
            async move { platform.get_item(&id).await }
        })
        .await;

        match fetched {
            Ok(Some(item)) => match self.pull_one(&item).await {
                Ok(PullOutcome::Corrected) => {
                    tally.matched += 1;
                    tally.updated += 1;
                }
                Ok(PullOutcome::Unchanged) => {
                    tally.matched += 1;
                    tally.skipped += 1;
                }
                Ok(PullOutcome::NoMatch) => tally.skipped += 1,
                Err(e) => {
                    error!(platform_item_id, error = %e, "Failed to reconcile item from event");
                    tally.errors.push(format!("{}: {}", platform_item_id, e));
                }
            },
            Ok(None) => {
                info!(platform_item_id, "Platform no longer knows the item; skipping");
                tally.skipped += 1;
            }
            Err(e) => {
                error!(platform_item_id, error = %e, "Failed to fetch item for event");
                tally.errors.push(format!("{}: {}", platform_item_id, e));
            }
        }

        tally
    }

    /// Reacts to an `order.completed` event: fetches the order from the
    /// platform and records it through the sale coordinator so platform
    /// sales deplete local stock exactly once.
    ///
    /// Fetch failures propagate so the webhook returns an error and the
    /// platform redelivers. Everything else resolves to an `OrderIngest`.
    #[instrument(skip(self))]
    pub async fn handle_order_event(
        &self,
        platform_order_id: &str,
    ) -> Result<OrderIngest, ServiceError> {
        let idempotency_key = format!("platform:{}", platform_order_id);
        if let Some(existing) = self.sales_probe(&idempotency_key).await? {
            info!(platform_order_id, order_id = %existing, "Platform order already recorded");
            return Ok(OrderIngest::AlreadyRecorded(existing));
        }

        let platform = Arc::clone(&self.platform);
        let id = platform_order_id.to_string();
        let order = with_retry(self.retries, "fetch platform order", move || {
            let platform = Arc::clone(&platform);
            let id = id.clone();
            async move { platform.get_order(&id).await }
        })
        .await?;

        let Some(order) = order else {
            return Ok(OrderIngest::Skipped(format!(
                "platform order {} not found",
                platform_order_id
            )));
        };
        if !order.is_completed() {
            return Ok(OrderIngest::Skipped(format!(
                "platform order {} is {}, not completed",
                platform_order_id, order.state
            )));
        }

        // Translate platform lines into local stock items. Lines without a
        // local counterpart are logged and dropped; the platform already
        // accounts for their stock.
        let mut lines = Vec::new();
        let mut subtotal = rust_decimal::Decimal::ZERO;
        for line in &order.lines {
            let Some(item_id) = line.item_id.as_deref() else {
                warn!(platform_order_id, line = %line.name, "Order line has no item id; skipping line");
                continue;
            };
            let local = stock_item::Entity::find()
                .filter(stock_item::Column::PlatformItemId.eq(item_id))
                .one(&*self.db)
                .await?;
            match local {
                Some(local) => {
                    subtotal += line.unit_price * rust_decimal::Decimal::from(line.quantity);
                    lines.push(SaleLine {
                        stock_item_id: local.id,
                        quantity: line.quantity,
                    });
                }
                None => {
                    warn!(
                        platform_order_id,
                        platform_item_id = item_id,
                        line = %line.name,
                        "Order line references an unknown item; skipping line"
                    );
                }
            }
        }

        if lines.is_empty() {
            return Ok(OrderIngest::Skipped(format!(
                "no line of platform order {} maps to a local stock item",
                platform_order_id
            )));
        }

        let tax = (order.total - subtotal).max(rust_decimal::Decimal::ZERO);
        let request = SaleRequest {
            idempotency_key,
            channel: Channel::Platform,
            lines,
            customer_email: None,
            platform_order_id: Some(platform_order_id.to_string()),
            totals: Some(SaleTotals {
                subtotal,
                tax,
                shipping: rust_decimal::Decimal::ZERO,
                total: order.total,
            }),
            actor: "platform_webhook".to_string(),
        };

        match self.sales.sell(request).await {
            Ok(recorded) => {
                info!(platform_order_id, order_id = %recorded.id, "Platform order recorded");
                Ok(OrderIngest::Recorded(recorded.id))
            }
            Err(ServiceError::InsufficientStock(msg)) => {
                // The platform already sold the unit; the next pull will
                // correct the count. Recording a negative is worse than
                // skipping.
                error!(platform_order_id, %msg, "Platform order exceeds local stock; skipped");
                Ok(OrderIngest::Skipped(format!(
                    "insufficient local stock for platform order {}: {}",
                    platform_order_id, msg
                )))
            }
            Err(e) => Err(e),
        }
    }

    /// Last checkpoint plus a live comparison of matched counts. An
    /// unreachable platform reports `connected: false` rather than failing.
    pub async fn status(&self) -> Result<SyncStatus, ServiceError> {
        let checkpoint = sync_checkpoint::Entity::find_by_id(CHECKPOINT_ID)
            .one(&*self.db)
            .await?;

        let (connected, mismatches) = match self.platform.list_items().await {
            Ok(items) => {
                let mut mismatches = Vec::new();
                for platform_item in &items {
                    if let Some(local) = self.find_match(platform_item).await? {
                        if local.quantity != platform_item.stock_count {
                            mismatches.push(CountMismatch {
                                stock_item_id: local.id,
                                name: local.name,
                                local_quantity: local.quantity,
                                platform_quantity: platform_item.stock_count,
                            });
                        }
                    }
                }
                (true, mismatches)
            }
            Err(e) => {
                warn!(error = %e, "Platform unreachable during status check");
                (false, Vec::new())
            }
        };

        Ok(SyncStatus {
            connected,
            last_sync_at: checkpoint.as_ref().map(|c| c.last_sync_at),
            last_tally: checkpoint,
            mismatches,
        })
    }

    /// Match precedence: stored platform link, then SKU, then barcode.
    async fn find_match(
        &self,
        platform_item: &PlatformItem,
    ) -> Result<Option<stock_item::Model>, ServiceError> {
        let by_link = stock_item::Entity::find()
            .filter(stock_item::Column::PlatformItemId.eq(platform_item.id.as_str()))
            .one(&*self.db)
            .await?;
        if by_link.is_some() {
            return Ok(by_link);
        }

        if let Some(sku) = platform_item.sku.as_deref().filter(|s| !s.is_empty()) {
            let by_sku = stock_item::Entity::find()
                .filter(stock_item::Column::Sku.eq(sku))
                .one(&*self.db)
                .await?;
            if by_sku.is_some() {
                return Ok(by_sku);
            }
        }

        if let Some(barcode) = platform_item.barcode.as_deref().filter(|s| !s.is_empty()) {
            let by_barcode = stock_item::Entity::find()
                .filter(stock_item::Column::Barcode.eq(barcode))
                .one(&*self.db)
                .await?;
            if by_barcode.is_some() {
                return Ok(by_barcode);
            }
        }

        Ok(None)
    }

    async fn sales_probe(&self, idempotency_key: &str) -> Result<Option<Uuid>, ServiceError> {
        let existing = crate::entities::order::Entity::find()
            .filter(crate::entities::order::Column::IdempotencyKey.eq(idempotency_key))
            .one(&*self.db)
            .await?;
        Ok(existing.map(|o| o.id))
    }

    /// Upserts the single checkpoint row. Checkpoint bookkeeping never
    /// fails a sync that already did its work.
    async fn save_checkpoint(&self, tally: &SyncTally) {
        let errors = serde_json::to_value(&tally.errors).unwrap_or_else(|_| serde_json::json!([]));
        let result = match sync_checkpoint::Entity::find_by_id(CHECKPOINT_ID)
            .one(&*self.db)
            .await
        {
            Ok(Some(existing)) => {
                let mut active: sync_checkpoint::ActiveModel = existing.into();
                active.last_sync_at = Set(Utc::now());
                active.total = Set(tally.total);
                active.matched = Set(tally.matched);
                active.created = Set(tally.created);
                active.updated = Set(tally.updated);
                active.skipped = Set(tally.skipped);
                active.errors = Set(errors);
                active.update(&*self.db).await.map(|_| ())
            }
            Ok(None) => sync_checkpoint::ActiveModel {
                id: Set(CHECKPOINT_ID),
                last_sync_at: Set(Utc::now()),
                total: Set(tally.total),
                matched: Set(tally.matched),
                created: Set(tally.created),
                updated: Set(tally.updated),
                skipped: Set(tally.skipped),
                errors: Set(errors),
            }
            .insert(&*self.db)
            .await
            .map(|_| ()),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            warn!(error = %e, "Failed to persist sync checkpoint");
        }
    }
}

enum PullOutcome {
    Corrected,
    Unchanged,
    NoMatch,
}

/// Retries transient platform failures with exponential backoff. Only
/// `ExternalServiceError` is retried; every other error is final.
pub async fn with_retry<T, F, Fut>(
    attempts: u32,
    what: &str,
    mut call: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut delay = RETRY_BASE_DELAY;
    let mut last_err = None;
    for attempt in 1..=attempts.max(1) {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e @ ServiceError::ExternalServiceError(_)) => {
                warn!(what, attempt, error = %e, "Platform call failed; will retry");
                last_err = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err
        .unwrap_or_else(|| ServiceError::InternalError(format!("{what}: retry loop exhausted"))))
}
