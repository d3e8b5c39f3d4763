use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::entities::Channel;
use crate::errors::ServiceError;
use crate::services::orders::OrderResponse;
use crate::services::sales::{SaleLine, SaleRequest};
use crate::AppState;

#[derive(Debug, Deserialize, Serialize)]
pub struct SaleLineRequest {
    pub stock_item_id: Uuid,
    pub quantity: i32,
}

/// Payment-callback payload for a web checkout. The session id doubles as
/// the idempotency key, so a replayed callback returns the original order.
#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutCompleteRequest {
    #[validate(length(min = 1))]
    pub session_id: String,
    pub customer_email: Option<String>,
    #[validate(length(min = 1))]
    pub items: Vec<SaleLineRequest>,
}

/// In-store sale rung up at the register. The receipt reference is the
/// idempotency key.
#[derive(Debug, Deserialize, Validate)]
pub struct PosSaleRequest {
    #[validate(length(min = 1))]
    pub reference: String,
    pub customer_email: Option<String>,
    #[validate(length(min = 1))]
    pub items: Vec<SaleLineRequest>,
}

fn lines(items: Vec<SaleLineRequest>) -> Vec<SaleLine> {
    items
        .into_iter()
        .map(|i| SaleLine {
            stock_item_id: i.stock_item_id,
            quantity: i.quantity,
        })
        .collect()
}

#[instrument(skip(state, payload))]
pub async fn checkout_complete(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutCompleteRequest>,
) -> Result<Json<OrderResponse>, ServiceError> {
    payload.validate()?;

    let order = state
        .sales
        .sell(SaleRequest {
            idempotency_key: format!("checkout:{}", payload.session_id),
            channel: Channel::Web,
            lines: lines(payload.items),
            customer_email: payload.customer_email,
            platform_order_id: None,
            totals: None,
            actor: "payment_callback".to_string(),
        })
        .await?;

    Ok(Json(state.orders.get_order(order.id).await?))
}

#[instrument(skip(state, payload))]
pub async fn pos_sale(
    State(state): State<AppState>,
    Json(payload): Json<PosSaleRequest>,
) -> Result<Json<OrderResponse>, ServiceError> {
    payload.validate()?;

    let order = state
        .sales
        .sell(SaleRequest {
            idempotency_key: format!("pos:{}", payload.reference),
            channel: Channel::InStore,
            lines: lines(payload.items),
            customer_email: payload.customer_email,
            platform_order_id: None,
            totals: None,
            actor: "pos_terminal".to_string(),
        })
        .await?;

    Ok(Json(state.orders.get_order(order.id).await?))
}
