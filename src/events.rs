use std::sync::Arc;

use sea_orm::{DatabaseConnection, EntityTrait};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::{stock_item, AdjustmentSource, Channel};
use crate::platform::PlatformClient;

/// Events emitted by the reconciliation core after a state change commits.
#[derive(Debug, Clone)]
pub enum Event {
    SaleCompleted {
        order_id: Uuid,
        channel: Channel,
        stock_item_ids: Vec<Uuid>,
    },
    StockAdjusted {
        stock_item_id: Uuid,
        source: AdjustmentSource,
        new_quantity: i32,
    },
    SyncCompleted {
        matched: i32,
        updated: i32,
        skipped: i32,
        errors: usize,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Background consumer. Its one side effect is the fire-and-forget stock
/// push to the external platform after a locally originated change; that
/// push sits outside the sale transaction, so a failure here is an
/// eventual-consistency gap that must be visible in the logs, never a
/// rolled-back sale.
pub async fn process_events(
    mut receiver: mpsc::Receiver<Event>,
    db: Arc<DatabaseConnection>,
    platform: Option<Arc<dyn PlatformClient>>,
) {
    while let Some(event) = receiver.recv().await {
        match event {
            Event::SaleCompleted {
                order_id,
                channel,
                stock_item_ids,
            } => {
                info!(order_id = %order_id, channel = %channel, "Sale committed");
                // Platform-originated sales already carry the platform's
                // own count; pushing back would echo.
                if channel != Channel::Platform {
                    for id in stock_item_ids {
                        push_item_stock(&db, platform.as_ref(), id).await;
                    }
                }
            }
            Event::StockAdjusted {
                stock_item_id,
                source,
                new_quantity,
            } => {
                info!(stock_item_id = %stock_item_id, source = %source, new_quantity, "Stock adjusted");
                if matches!(
                    source,
                    AdjustmentSource::Admin | AdjustmentSource::ReconciliationAudit
                ) {
                    push_item_stock(&db, platform.as_ref(), stock_item_id).await;
                }
            }
            Event::SyncCompleted {
                matched,
                updated,
                skipped,
                errors,
            } => {
                info!(matched, updated, skipped, errors, "Sync pass completed");
            }
        }
    }
}

async fn push_item_stock(
    db: &DatabaseConnection,
    platform: Option<&Arc<dyn PlatformClient>>,
    stock_item_id: Uuid,
) {
    let Some(client) = platform else {
        return;
    };

    let item = match stock_item::Entity::find_by_id(stock_item_id).one(db).await {
        Ok(Some(item)) => item,
        Ok(None) => {
            warn!(stock_item_id = %stock_item_id, "Stock push skipped: item no longer exists");
            return;
        }
        Err(e) => {
            warn!(stock_item_id = %stock_item_id, error = %e, "Stock push skipped: lookup failed");
            return;
        }
    };

    let Some(platform_item_id) = item.platform_item_id.as_deref() else {
        return; // not linked to the platform
    };

    if let Err(e) = client.update_stock(platform_item_id, item.quantity).await {
        warn!(
            stock_item_id = %stock_item_id,
            platform_item_id,
            error = %e,
            "Failed to push stock count to platform; counts diverge until next sync"
        );
    }
}
