pub mod inventory;
pub mod orders;
pub mod sales;
pub mod sync;
