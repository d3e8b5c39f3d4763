use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a stock count moved.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AdjustmentReason {
    #[sea_orm(string_value = "sold_online")]
    SoldOnline,
    #[sea_orm(string_value = "sold_in_store")]
    SoldInStore,
    #[sea_orm(string_value = "sold_by_platform")]
    SoldByPlatform,
    #[sea_orm(string_value = "returned")]
    Returned,
    #[sea_orm(string_value = "damaged")]
    Damaged,
    #[sea_orm(string_value = "restocked")]
    Restocked,
    #[sea_orm(string_value = "manual_correction")]
    ManualCorrection,
    #[sea_orm(string_value = "sync_correction")]
    SyncCorrection,
}

/// Which subsystem produced the adjustment.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AdjustmentSource {
    #[sea_orm(string_value = "web_channel")]
    WebChannel,
    #[sea_orm(string_value = "pos_channel")]
    PosChannel,
    #[sea_orm(string_value = "platform_webhook")]
    PlatformWebhook,
    #[sea_orm(string_value = "platform_sync")]
    PlatformSync,
    #[sea_orm(string_value = "admin")]
    Admin,
    #[sea_orm(string_value = "reconciliation_audit")]
    ReconciliationAudit,
}

impl AdjustmentSource {
    /// Authoritative sources may set an absolute count; every other source
    /// moves quantity only through signed deltas.
    pub fn is_authoritative(&self) -> bool {
        matches!(self, Self::PlatformSync | Self::ReconciliationAudit)
    }
}

/// Append-only ledger entry documenting one quantity change.
///
/// Invariant: `new_quantity = previous_quantity + quantity_delta`, and
/// replaying all entries for an item in timestamp order reproduces its
/// current quantity. Entries are never updated or deleted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_adjustments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub stock_item_id: Uuid,
    pub quantity_delta: i32,
    pub reason: AdjustmentReason,
    pub previous_quantity: i32,
    pub new_quantity: i32,
    pub source: AdjustmentSource,
    pub adjusted_by: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::stock_item::Entity",
        from = "Column::StockItemId",
        to = "super::stock_item::Column::Id"
    )]
    StockItem,
}

impl Related<super::stock_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
