use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use crate::entities::OrderStatus;
use crate::errors::ServiceError;
use crate::services::orders::{OrderListResponse, OrderResponse};
use crate::{AppState, ListQuery};

pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<OrderListResponse>, ServiceError> {
    Ok(Json(state.orders.list_orders(query.page, query.limit).await?))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ServiceError> {
    Ok(Json(state.orders.get_order(id).await?))
}

pub async fn get_by_order_number(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<Json<OrderResponse>, ServiceError> {
    Ok(Json(state.orders.get_by_order_number(&order_number).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[instrument(skip(state, payload), fields(order_id = %id))]
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ServiceError> {
    Ok(Json(state.orders.update_status(id, payload.status).await?))
}
