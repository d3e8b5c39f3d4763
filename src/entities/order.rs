use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stock_adjustment::{AdjustmentReason, AdjustmentSource};

/// Point of sale that originated an order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Channel {
    #[sea_orm(string_value = "web")]
    Web,
    #[sea_orm(string_value = "in_store")]
    InStore,
    #[sea_orm(string_value = "platform")]
    Platform,
}

impl Channel {
    pub fn sale_reason(&self) -> AdjustmentReason {
        match self {
            Self::Web => AdjustmentReason::SoldOnline,
            Self::InStore => AdjustmentReason::SoldInStore,
            Self::Platform => AdjustmentReason::SoldByPlatform,
        }
    }

    pub fn sale_source(&self) -> AdjustmentSource {
        match self {
            Self::Web => AdjustmentSource::WebChannel,
            Self::InStore => AdjustmentSource::PosChannel,
            Self::Platform => AdjustmentSource::PlatformWebhook,
        }
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(24))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "picked_up")]
    PickedUp,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "refunded")]
    Refunded,
    #[sea_orm(string_value = "partially_refunded")]
    PartiallyRefunded,
}

impl OrderStatus {
    fn is_post_payment(&self) -> bool {
        matches!(
            self,
            Self::Paid
                | Self::Processing
                | Self::Shipped
                | Self::PickedUp
                | Self::Delivered
                | Self::PartiallyRefunded
        )
    }

    /// Forward path is pending -> paid -> processing -> shipped/picked_up ->
    /// delivered. Cancellation branches off pending/paid; refunds branch off
    /// any post-payment state.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (*self, next) {
            (Pending, Paid)
            | (Paid, Processing)
            | (Processing, Shipped)
            | (Processing, PickedUp)
            | (Shipped, Delivered)
            | (PickedUp, Delivered) => true,
            (Pending, Cancelled) | (Paid, Cancelled) => true,
            (from, Refunded) | (from, PartiallyRefunded) => from.is_post_payment(),
            _ => false,
        }
    }
}

/// A completed (or in-flight) sale, one row per idempotency key.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub channel: Channel,
    pub status: OrderStatus,
    /// Caller- or event-supplied key that makes repeated submissions of the
    /// same sale collapse into one order. Unique across the ledger.
    #[sea_orm(unique)]
    pub idempotency_key: String,
    pub customer_email: Option<String>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub platform_order_id: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
