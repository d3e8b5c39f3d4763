use std::time::Duration;

use sea_orm::sea_query::Index;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Schema};
use tracing::info;

use crate::config::AppConfig;
use crate::entities;

pub type DbPool = DatabaseConnection;

/// Opens the connection pool described by the application config.
pub async fn establish_connection(cfg: &AppConfig) -> Result<DatabaseConnection, DbErr> {
    let mut opts = ConnectOptions::new(cfg.database_url.clone());
    opts.max_connections(cfg.db_max_connections)
        .min_connections(cfg.db_min_connections)
        .connect_timeout(Duration::from_secs(cfg.db_connect_timeout_secs))
        .acquire_timeout(Duration::from_secs(cfg.db_acquire_timeout_secs))
        .sqlx_logging(false);

    Database::connect(opts).await
}

/// Bootstraps the schema from the entity definitions. Idempotent; used on
/// startup behind the `auto_migrate` flag and by the test harness.
pub async fn run_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut tables = vec![
        schema.create_table_from_entity(entities::stock_item::Entity),
        schema.create_table_from_entity(entities::stock_adjustment::Entity),
        schema.create_table_from_entity(entities::order::Entity),
        schema.create_table_from_entity(entities::order_item::Entity),
        schema.create_table_from_entity(entities::sync_checkpoint::Entity),
    ];
    for stmt in tables.iter_mut() {
        stmt.if_not_exists();
        db.execute(backend.build(stmt)).await?;
    }

    // Ledger reads are always per-item in timestamp order.
    let ledger_idx = Index::create()
        .name("idx_stock_adjustments_item_created")
        .table(entities::stock_adjustment::Entity)
        .col(entities::stock_adjustment::Column::StockItemId)
        .col(entities::stock_adjustment::Column::CreatedAt)
        .if_not_exists()
        .to_owned();
    db.execute(backend.build(&ledger_idx)).await?;

    let order_items_idx = Index::create()
        .name("idx_order_items_order")
        .table(entities::order_item::Entity)
        .col(entities::order_item::Column::OrderId)
        .if_not_exists()
        .to_owned();
    db.execute(backend.build(&order_items_idx)).await?;

    info!("Database schema is up to date");
    Ok(())
}
