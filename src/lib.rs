pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod platform;
pub mod services;
pub mod webhooks;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::platform::PlatformClient;
use crate::services::inventory::InventoryService;
use crate::services::orders::OrderService;
use crate::services::sales::SaleCoordinator;
use crate::services::sync::ChannelSyncService;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub event_sender: Option<EventSender>,
    pub inventory: InventoryService,
    pub orders: OrderService,
    pub sales: SaleCoordinator,
    /// Present only when the platform connection is configured.
    pub sync: Option<Arc<ChannelSyncService>>,
}

impl AppState {
    pub fn new(
        db: DatabaseConnection,
        config: AppConfig,
        event_sender: Option<EventSender>,
        platform: Option<Arc<dyn PlatformClient>>,
    ) -> Self {
        let db = Arc::new(db);
        let inventory = InventoryService::new(Arc::clone(&db), event_sender.clone());
        let orders = OrderService::new(Arc::clone(&db));
        let sales = SaleCoordinator::new(Arc::clone(&db), event_sender.clone());

        let sync = platform.map(|client| {
            Arc::new(ChannelSyncService::new(
                Arc::clone(&db),
                inventory.clone(),
                sales.clone(),
                client,
                config.platform.sync_retries,
                event_sender.clone(),
            ))
        });

        Self {
            db,
            config: Arc::new(config),
            event_sender,
            inventory,
            orders,
            sales,
            sync,
        }
    }

    pub fn sync_service(&self) -> Result<&ChannelSyncService, ServiceError> {
        self.sync.as_deref().ok_or_else(|| {
            ServiceError::BadRequest(
                "Platform sync is not configured; set platform.base_url and platform.api_token"
                    .to_string(),
            )
        })
    }
}

/// Common pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn service_status(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "platform_configured": state.sync.is_some(),
    }))
}

/// Builds the full HTTP surface. Sync triggers and reconciliation sit
/// behind the admin gate; webhook deliveries authenticate with their
/// signature instead.
pub fn app_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/sync/pull", post(handlers::sync::trigger_pull))
        .route("/sync/push", post(handlers::sync::trigger_push))
        .route("/sync/full", post(handlers::sync::trigger_full_sync))
        .route("/inventory/reconcile", post(handlers::inventory::reconcile))
        .route(
            "/inventory/:id/adjust",
            post(handlers::inventory::adjust_item),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::require_admin,
        ));

    let api = Router::new()
        .route(
            "/checkout/complete",
            post(handlers::sales::checkout_complete),
        )
        .route("/pos/sales", post(handlers::sales::pos_sale))
        .route("/webhooks/platform", post(handlers::webhooks::platform_webhook))
        .route("/sync/status", get(handlers::sync::sync_status))
        .route(
            "/inventory",
            get(handlers::inventory::list_items).post(handlers::inventory::create_item),
        )
        .route("/inventory/low-stock", get(handlers::inventory::low_stock))
        .route(
            "/inventory/:id",
            get(handlers::inventory::get_item).delete(handlers::inventory::deactivate_item),
        )
        .route(
            "/inventory/:id/adjustments",
            get(handlers::inventory::item_adjustments),
        )
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/orders/by-number/:order_number",
            get(handlers::orders::get_by_order_number),
        )
        .route("/orders/:id/status", put(handlers::orders::update_status))
        .route("/status", get(service_status))
        .merge(admin)
        .with_state(state);

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
}
