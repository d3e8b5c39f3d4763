use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
    SqlErr, TransactionTrait,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::{order, order_item, stock_item, Channel, OrderStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::inventory::{AdjustmentContext, InventoryService};

#[derive(Debug, Clone)]
pub struct SaleLine {
    pub stock_item_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct SaleTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone)]
pub struct SaleRequest {
    /// Channel-unique key: payment session id, POS receipt reference, or
    /// the external platform's order identifier.
    pub idempotency_key: String,
    pub channel: Channel,
    pub lines: Vec<SaleLine>,
    pub customer_email: Option<String>,
    pub platform_order_id: Option<String>,
    /// Totals from the payment processor / platform; computed from item
    /// prices when absent (POS quick sales).
    pub totals: Option<SaleTotals>,
    pub actor: String,
}

/// The single code path every channel uses to turn line items into stock
/// depletion plus an order row.
///
/// Steps: idempotent short-circuit, per-line negative deltas through the
/// inventory store, order + item inserts — all inside one database
/// transaction. A crash between decrementing stock and recording the order
/// is structurally unreachable.
#[derive(Clone)]
pub struct SaleCoordinator {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl SaleCoordinator {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, request), fields(idempotency_key = %request.idempotency_key, channel = %request.channel))]
    pub async fn sell(&self, request: SaleRequest) -> Result<order::Model, ServiceError> {
        if request.idempotency_key.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Idempotency key is required".to_string(),
            ));
        }
        if request.lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "A sale needs at least one line item".to_string(),
            ));
        }
        if request.lines.iter().any(|l| l.quantity < 1) {
            return Err(ServiceError::ValidationError(
                "Line quantities must be at least 1".to_string(),
            ));
        }

        // Idempotent short-circuit: duplicate webhook deliveries and client
        // retries resolve to the original order, with zero new ledger
        // entries.
        if let Some(existing) = self.find_existing(&request.idempotency_key).await? {
            info!(order_id = %existing.id, "Duplicate sale attempt resolved to existing order");
            return Ok(existing);
        }

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_number = Self::order_number(order_id);

        let txn = self.db.begin().await?;

        let mut computed_subtotal = Decimal::ZERO;
        let mut item_rows = Vec::with_capacity(request.lines.len());
        let mut touched = Vec::with_capacity(request.lines.len());

        for line in &request.lines {
            let item = stock_item::Entity::find_by_id(line.stock_item_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "Stock item {} not found",
                        line.stock_item_id
                    ))
                })?;

            let ctx = AdjustmentContext {
                reason: request.channel.sale_reason(),
                source: request.channel.sale_source(),
                adjusted_by: request.actor.clone(),
                note: Some(format!("order {}", order_number)),
            };
            // Rejects the whole sale when any line would go negative; the
            // deltas already applied roll back with the transaction.
            InventoryService::apply_delta_on(&txn, line.stock_item_id, -line.quantity, &ctx)
                .await?;

            computed_subtotal += item.price * Decimal::from(line.quantity);
            item_rows.push(order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                stock_item_id: Set(Some(item.id)),
                name: Set(item.name),
                unit_price: Set(item.price),
                quantity: Set(line.quantity),
            });
            touched.push(line.stock_item_id);
        }

        let totals = request.totals.clone().unwrap_or(SaleTotals {
            subtotal: computed_subtotal,
            tax: Decimal::ZERO,
            shipping: Decimal::ZERO,
            total: computed_subtotal,
        });

        let insert_result = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number),
            channel: Set(request.channel),
            status: Set(OrderStatus::Paid),
            idempotency_key: Set(request.idempotency_key.clone()),
            customer_email: Set(request.customer_email.clone()),
            subtotal: Set(totals.subtotal),
            tax: Set(totals.tax),
            shipping: Set(totals.shipping),
            total: Set(totals.total),
            platform_order_id: Set(request.platform_order_id.clone()),
            note: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await;

        let order = match insert_result {
            Ok(order) => order,
            Err(e) if Self::is_unique_violation(&e) => {
                // Lost a race on the idempotency key: another request with
                // the same key committed first. Roll back our deltas and
                // hand back the winner's order.
                txn.rollback().await.ok();
                warn!(idempotency_key = %request.idempotency_key, "Idempotency-key race lost; returning committed order");
                return self
                    .find_existing(&request.idempotency_key)
                    .await?
                    .ok_or_else(|| ServiceError::DatabaseError(e));
            }
            Err(e) => return Err(e.into()),
        };

        for row in item_rows {
            row.insert(&txn).await?;
        }

        txn.commit().await?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            lines = touched.len(),
            "Sale committed"
        );

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::SaleCompleted {
                    order_id: order.id,
                    channel: request.channel,
                    stock_item_ids: touched,
                })
                .await
            {
                warn!(order_id = %order.id, error = %e, "Failed to send sale completed event");
            }
        }

        Ok(order)
    }

    async fn find_existing(&self, key: &str) -> Result<Option<order::Model>, ServiceError> {
        let found = order::Entity::find()
            .filter(order::Column::IdempotencyKey.eq(key))
            .one(&*self.db)
            .await?;
        Ok(found)
    }

    fn is_unique_violation(err: &DbErr) -> bool {
        matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
    }

    fn order_number(order_id: Uuid) -> String {
        let suffix = order_id.simple().to_string();
        format!(
            "SO-{}-{}",
            Utc::now().format("%y%m%d"),
            &suffix[..4].to_uppercase()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_number_shape() {
        let n = SaleCoordinator::order_number(Uuid::new_v4());
        let parts: Vec<&str> = n.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "SO");
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2].len(), 4);
    }
}
