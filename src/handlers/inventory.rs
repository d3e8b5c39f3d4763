use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::entities::{stock_adjustment, stock_item, AdjustmentReason, AdjustmentSource};
use crate::errors::ServiceError;
use crate::services::inventory::{AdjustmentContext, NewStockItem};
use crate::{AppState, ListQuery};

pub async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ServiceError> {
    let (items, total) = state.inventory.list_items(query.page, query.limit).await?;
    Ok(Json(json!({
        "items": items,
        "total": total,
        "page": query.page,
        "per_page": query.limit,
    })))
}

pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<stock_item::Model>, ServiceError> {
    Ok(Json(state.inventory.get_item(id).await?))
}

/// The item's adjustment ledger, oldest first.
pub async fn item_adjustments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<stock_adjustment::Model>>, ServiceError> {
    // 404 for unknown items rather than an empty ledger
    state.inventory.get_item(id).await?;
    Ok(Json(state.inventory.item_history(id).await?))
}

pub async fn low_stock(
    State(state): State<AppState>,
) -> Result<Json<Vec<stock_item::Model>>, ServiceError> {
    Ok(Json(state.inventory.low_stock_items().await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateItemRequest {
    #[validate(length(min = 1))]
    pub name: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    #[serde(default)]
    pub initial_quantity: i32,
    #[serde(default = "default_threshold")]
    pub low_stock_threshold: i32,
    pub price: Decimal,
}

fn default_threshold() -> i32 {
    5
}

#[instrument(skip(state, payload), fields(name = %payload.name))]
pub async fn create_item(
    State(state): State<AppState>,
    Json(payload): Json<CreateItemRequest>,
) -> Result<Json<stock_item::Model>, ServiceError> {
    payload.validate()?;

    let item = state
        .inventory
        .create_item(
            NewStockItem {
                name: payload.name,
                sku: payload.sku,
                barcode: payload.barcode,
                platform_item_id: None,
                initial_quantity: payload.initial_quantity,
                low_stock_threshold: payload.low_stock_threshold,
                price: payload.price,
            },
            "admin",
        )
        .await?;

    Ok(Json(item))
}

/// Manual stock adjustment: returns, damage write-offs, restocks. Always a
/// signed delta; absolute counts go through the reconcile endpoint.
#[derive(Debug, Deserialize)]
pub struct AdjustItemRequest {
    pub delta: i32,
    pub reason: AdjustmentReason,
    pub note: Option<String>,
}

#[instrument(skip(state, payload), fields(stock_item_id = %id, delta = payload.delta))]
pub async fn adjust_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdjustItemRequest>,
) -> Result<Json<stock_adjustment::Model>, ServiceError> {
    let entry = state
        .inventory
        .apply_delta(
            id,
            payload.delta,
            AdjustmentContext {
                reason: payload.reason,
                source: AdjustmentSource::Admin,
                adjusted_by: "admin".to_string(),
                note: payload.note,
            },
        )
        .await?;
    Ok(Json(entry))
}

/// Deactivation, not deletion: orders and the ledger keep their references.
pub async fn deactivate_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ServiceError> {
    state.inventory.deactivate_item(id).await?;
    Ok(Json(json!({ "deactivated": id })))
}

/// Physical count submission. Reports the discrepancy against the recorded
/// quantity; with `apply` set, writes the counted value through the ledger
/// as an audit correction.
#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub stock_item_id: Uuid,
    pub counted_quantity: i32,
    pub notes: Option<String>,
    #[serde(default)]
    pub apply: bool,
}

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub stock_item_id: Uuid,
    pub recorded_quantity: i32,
    pub counted_quantity: i32,
    pub discrepancy: i32,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjustment: Option<stock_adjustment::Model>,
}

#[instrument(skip(state, payload), fields(stock_item_id = %payload.stock_item_id))]
pub async fn reconcile(
    State(state): State<AppState>,
    Json(payload): Json<ReconcileRequest>,
) -> Result<Json<ReconcileResponse>, ServiceError> {
    if payload.counted_quantity < 0 {
        return Err(ServiceError::ValidationError(
            "Counted quantity must be non-negative".to_string(),
        ));
    }

    let item = state.inventory.get_item(payload.stock_item_id).await?;
    let discrepancy = payload.counted_quantity - item.quantity;

    let mut adjustment = None;
    if payload.apply && discrepancy != 0 {
        let ctx = AdjustmentContext {
            reason: AdjustmentReason::ManualCorrection,
            source: AdjustmentSource::ReconciliationAudit,
            adjusted_by: "admin".to_string(),
            note: payload.notes.clone(),
        };
        adjustment = state
            .inventory
            .set_authoritative(item.id, payload.counted_quantity, ctx)
            .await?;
        info!(
            stock_item_id = %item.id,
            recorded = item.quantity,
            counted = payload.counted_quantity,
            "Reconciliation correction applied"
        );
    }

    Ok(Json(ReconcileResponse {
        stock_item_id: item.id,
        recorded_quantity: item.quantity,
        counted_quantity: payload.counted_quantity,
        discrepancy,
        applied: adjustment.is_some(),
        adjustment,
    }))
}
