pub mod order;
pub mod order_item;
pub mod stock_adjustment;
pub mod stock_item;
pub mod sync_checkpoint;

pub use order::{Channel, OrderStatus};
pub use stock_adjustment::{AdjustmentReason, AdjustmentSource};
