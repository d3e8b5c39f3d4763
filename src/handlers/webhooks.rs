use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::errors::ServiceError;
use crate::services::sync::OrderIngest;
use crate::webhooks::{
    verify_signature, PlatformEventPayload, EVENT_INVENTORY_UPDATED, EVENT_ORDER_COMPLETED,
    SIGNATURE_HEADER,
};
use crate::AppState;

/// Inbound platform webhook. The signature is checked against the raw body
/// before anything is parsed; the payload itself is only a pointer, so the
/// handlers re-fetch state from the platform rather than trusting the
/// delivery.
#[instrument(skip(state, headers, body))]
pub async fn platform_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ServiceError> {
    match state.config.platform.webhook_secret.as_deref() {
        Some(secret) => {
            let provided = headers
                .get(SIGNATURE_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if !verify_signature(&body, provided, secret) {
                warn!("Webhook rejected: bad or missing signature");
                return Err(ServiceError::Unauthorized(
                    "Invalid webhook signature".to_string(),
                ));
            }
        }
        None => {
            warn!("Webhook accepted without verification: no webhook secret configured");
        }
    }

    let payload: PlatformEventPayload = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::BadRequest(format!("Malformed webhook payload: {e}")))?;

    match payload.event_type.as_str() {
        EVENT_INVENTORY_UPDATED => {
            let tally = state
                .sync_service()?
                .handle_inventory_event(&payload.object_id)
                .await;
            Ok(Json(json!({ "received": true, "tally": tally })))
        }
        EVENT_ORDER_COMPLETED => {
            let outcome = state
                .sync_service()?
                .handle_order_event(&payload.object_id)
                .await?;
            let body = match outcome {
                OrderIngest::Recorded(order_id) => {
                    json!({ "received": true, "order_id": order_id, "duplicate": false })
                }
                OrderIngest::AlreadyRecorded(order_id) => {
                    json!({ "received": true, "order_id": order_id, "duplicate": true })
                }
                OrderIngest::Skipped(reason) => {
                    json!({ "received": true, "skipped": reason })
                }
            };
            Ok(Json(body))
        }
        other => {
            info!(event_type = other, "Ignoring unhandled webhook event type");
            Ok(Json(json!({ "received": true, "handled": false })))
        }
    }
}
