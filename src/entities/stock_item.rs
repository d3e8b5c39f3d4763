use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One sellable unit: a product or a specific size/condition variant.
///
/// `quantity` is never written directly by callers; every change goes
/// through the adjustment ledger so the count stays replayable.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    /// Identifier on the external POS platform, set on first intake or
    /// after the first successful sync match.
    pub platform_item_id: Option<String>,
    pub quantity: i32,
    pub low_stock_threshold: i32,
    pub price: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn is_low_stock(&self) -> bool {
        self.quantity > 0 && self.quantity <= self.low_stock_threshold
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_adjustment::Entity")]
    StockAdjustments,
}

impl Related<super::stock_adjustment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockAdjustments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(quantity: i32, threshold: i32) -> Model {
        Model {
            id: Uuid::new_v4(),
            name: "Jordan 1 Retro High".into(),
            sku: Some("J1-RH-10".into()),
            barcode: None,
            platform_item_id: None,
            quantity,
            low_stock_threshold: threshold,
            price: dec!(180.00),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn low_stock_excludes_sold_out() {
        assert!(item(2, 3).is_low_stock());
        assert!(!item(0, 3).is_low_stock());
        assert!(!item(4, 3).is_low_stock());
    }
}
