use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::PlatformConfig;
use crate::errors::ServiceError;

/// Item as reported by the external POS platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    /// The platform's current stock count. Authoritative for items it
    /// actively manages.
    pub stock_count: i32,
    #[serde(default)]
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformOrderLine {
    #[serde(default)]
    pub item_id: Option<String>,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformOrder {
    pub id: String,
    /// Platform-side order state; only completed/paid orders are ingested.
    pub state: String,
    pub total: Decimal,
    pub lines: Vec<PlatformOrderLine>,
}

impl PlatformOrder {
    pub fn is_completed(&self) -> bool {
        matches!(self.state.as_str(), "completed" | "paid" | "locked")
    }
}

/// Item payload sent to the platform on push.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformItemUpsert {
    pub name: String,
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    pub hidden: bool,
}

/// Sync contract against the external POS/inventory platform. The HTTP
/// implementation lives below; tests substitute an in-memory double.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn list_items(&self) -> Result<Vec<PlatformItem>, ServiceError>;

    /// Fetches one item; `Ok(None)` when the platform does not know the id.
    async fn get_item(&self, item_id: &str) -> Result<Option<PlatformItem>, ServiceError>;

    async fn get_order(&self, order_id: &str) -> Result<Option<PlatformOrder>, ServiceError>;

    async fn create_item(&self, item: &PlatformItemUpsert) -> Result<PlatformItem, ServiceError>;

    async fn update_item(
        &self,
        item_id: &str,
        item: &PlatformItemUpsert,
    ) -> Result<(), ServiceError>;

    async fn update_stock(&self, item_id: &str, quantity: i32) -> Result<(), ServiceError>;
}

/// Platform client over the HTTP pull API. Every call carries the bounded
/// timeout from config; failures surface as `ExternalServiceError`.
pub struct HttpPlatformClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl HttpPlatformClient {
    /// Returns `Ok(None)` when the platform is not configured.
    pub fn from_config(cfg: &PlatformConfig) -> Result<Option<Self>, ServiceError> {
        let (base_url, api_token) = match (&cfg.base_url, &cfg.api_token) {
            (Some(url), Some(token)) => (url.trim_end_matches('/').to_string(), token.clone()),
            _ => return Ok(None),
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("failed to build platform http client: {e}"))
            })?;

        Ok(Some(Self {
            http,
            base_url,
            api_token,
        }))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn external(what: &str, err: reqwest::Error) -> ServiceError {
        ServiceError::ExternalServiceError(format!("{what}: {err}"))
    }

    async fn expect_success(
        what: &str,
        resp: reqwest::Response,
    ) -> Result<reqwest::Response, ServiceError> {
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            Err(ServiceError::ExternalServiceError(format!(
                "{what}: platform returned {status}"
            )))
        }
    }
}

#[async_trait]
impl PlatformClient for HttpPlatformClient {
    async fn list_items(&self) -> Result<Vec<PlatformItem>, ServiceError> {
        let resp = self
            .http
            .get(self.url("/v1/items"))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Self::external("list items", e))?;
        Self::expect_success("list items", resp)
            .await?
            .json()
            .await
            .map_err(|e| Self::external("decode item list", e))
    }

    async fn get_item(&self, item_id: &str) -> Result<Option<PlatformItem>, ServiceError> {
        let resp = self
            .http
            .get(self.url(&format!("/v1/items/{item_id}")))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Self::external("fetch item", e))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::expect_success("fetch item", resp)
            .await?
            .json()
            .await
            .map(Some)
            .map_err(|e| Self::external("decode item", e))
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<PlatformOrder>, ServiceError> {
        let resp = self
            .http
            .get(self.url(&format!("/v1/orders/{order_id}")))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Self::external("fetch order", e))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::expect_success("fetch order", resp)
            .await?
            .json()
            .await
            .map(Some)
            .map_err(|e| Self::external("decode order", e))
    }

    async fn create_item(&self, item: &PlatformItemUpsert) -> Result<PlatformItem, ServiceError> {
        let resp = self
            .http
            .post(self.url("/v1/items"))
            .bearer_auth(&self.api_token)
            .json(item)
            .send()
            .await
            .map_err(|e| Self::external("create item", e))?;
        Self::expect_success("create item", resp)
            .await?
            .json()
            .await
            .map_err(|e| Self::external("decode created item", e))
    }

    async fn update_item(
        &self,
        item_id: &str,
        item: &PlatformItemUpsert,
    ) -> Result<(), ServiceError> {
        let resp = self
            .http
            .put(self.url(&format!("/v1/items/{item_id}")))
            .bearer_auth(&self.api_token)
            .json(item)
            .send()
            .await
            .map_err(|e| Self::external("update item", e))?;
        Self::expect_success("update item", resp).await.map(|_| ())
    }

    async fn update_stock(&self, item_id: &str, quantity: i32) -> Result<(), ServiceError> {
        let resp = self
            .http
            .put(self.url(&format!("/v1/items/{item_id}/stock")))
            .bearer_auth(&self.api_token)
            .json(&serde_json::json!({ "quantity": quantity }))
            .send()
            .await
            .map_err(|e| Self::external("update stock", e))?;
        Self::expect_success("update stock", resp).await.map(|_| ())
    }
}
