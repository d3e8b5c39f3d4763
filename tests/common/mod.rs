#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal_macros::dec;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use stockroom_api::config::{AppConfig, PlatformConfig};
use stockroom_api::db::run_migrations;
use stockroom_api::entities::stock_item;
use stockroom_api::errors::ServiceError;
use stockroom_api::platform::{
    PlatformClient, PlatformItem, PlatformItemUpsert, PlatformOrder,
};
use stockroom_api::services::inventory::NewStockItem;
use stockroom_api::AppState;

/// In-memory stand-in for the external platform. Mutations are recorded so
/// tests can assert on what was pushed.
#[derive(Default)]
pub struct InMemoryPlatform {
    pub items: Mutex<Vec<PlatformItem>>,
    pub orders: Mutex<Vec<PlatformOrder>>,
    pub stock_updates: Mutex<Vec<(String, i32)>>,
    next_id: AtomicU32,
}

impl InMemoryPlatform {
    pub fn with_items(items: Vec<PlatformItem>) -> Self {
        Self {
            items: Mutex::new(items),
            ..Default::default()
        }
    }

    pub fn add_order(&self, order: PlatformOrder) {
        self.orders.lock().unwrap().push(order);
    }
}

#[async_trait]
impl PlatformClient for InMemoryPlatform {
    async fn list_items(&self) -> Result<Vec<PlatformItem>, ServiceError> {
        Ok(self.items.lock().unwrap().clone())
    }

    async fn get_item(&self, item_id: &str) -> Result<Option<PlatformItem>, ServiceError> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.id == item_id)
            .cloned())
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<PlatformOrder>, ServiceError> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .iter()
            .find(|o| o.id == order_id)
            .cloned())
    }

    async fn create_item(&self, item: &PlatformItemUpsert) -> Result<PlatformItem, ServiceError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let created = PlatformItem {
            id: format!("plat-{n}"),
            name: item.name.clone(),
            sku: item.sku.clone(),
            barcode: item.barcode.clone(),
            stock_count: 0,
            price: Some(item.price),
        };
        self.items.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update_item(
        &self,
        item_id: &str,
        item: &PlatformItemUpsert,
    ) -> Result<(), ServiceError> {
        let mut items = self.items.lock().unwrap();
        match items.iter_mut().find(|i| i.id == item_id) {
            Some(existing) => {
                existing.name = item.name.clone();
                existing.sku = item.sku.clone();
                existing.barcode = item.barcode.clone();
                existing.price = Some(item.price);
                Ok(())
            }
            None => Err(ServiceError::ExternalServiceError(format!(
                "unknown item {item_id}"
            ))),
        }
    }

    async fn update_stock(&self, item_id: &str, quantity: i32) -> Result<(), ServiceError> {
        self.stock_updates
            .lock()
            .unwrap()
            .push((item_id.to_string(), quantity));
        if let Some(item) = self.items.lock().unwrap().iter_mut().find(|i| i.id == item_id) {
            item.stock_count = quantity;
        }
        Ok(())
    }
}

pub fn test_config(webhook_secret: Option<&str>) -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        environment: "development".to_string(),
        log_level: "warn".to_string(),
        log_json: false,
        auto_migrate: true,
        admin_api_token: None,
        cors_allowed_origins: None,
        platform: PlatformConfig {
            base_url: Some("http://platform.test".to_string()),
            api_token: Some("test-token".to_string()),
            webhook_secret: webhook_secret.map(|s| s.to_string()),
            timeout_secs: 2,
            sync_retries: 2,
        },
        db_max_connections: 1,
        db_min_connections: 1,
        db_connect_timeout_secs: 5,
        db_acquire_timeout_secs: 5,
    }
}

async fn open_db() -> DatabaseConnection {
    // A single connection keeps the in-memory database alive and shared
    // across all handles.
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1).sqlx_logging(false);
    let db = Database::connect(opts).await.expect("sqlite connect");
    run_migrations(&db).await.expect("schema bootstrap");
    db
}

pub async fn setup() -> AppState {
    setup_with_config(test_config(None)).await
}

pub async fn setup_with_config(config: AppConfig) -> AppState {
    let db = open_db().await;
    AppState::new(db, config, None, None)
}

pub async fn setup_with_platform(
    platform: Arc<InMemoryPlatform>,
    webhook_secret: Option<&str>,
) -> AppState {
    let db = open_db().await;
    AppState::new(
        db,
        test_config(webhook_secret),
        None,
        Some(platform as Arc<dyn PlatformClient>),
    )
}

pub async fn seed_item(
    state: &AppState,
    name: &str,
    sku: Option<&str>,
    quantity: i32,
) -> stock_item::Model {
    state
        .inventory
        .create_item(
            NewStockItem {
                name: name.to_string(),
                sku: sku.map(|s| s.to_string()),
                barcode: None,
                platform_item_id: None,
                initial_quantity: quantity,
                low_stock_threshold: 2,
                price: dec!(19.99),
            },
            "test",
        )
        .await
        .expect("seed item")
}

pub fn platform_item(id: &str, sku: Option<&str>, stock: i32) -> PlatformItem {
    PlatformItem {
        id: id.to_string(),
        name: format!("item {id}"),
        sku: sku.map(|s| s.to_string()),
        barcode: None,
        stock_count: stock,
        price: Some(dec!(19.99)),
    }
}
