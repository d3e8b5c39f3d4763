use axum::{extract::State, Json};
use tracing::instrument;

use crate::errors::ServiceError;
use crate::services::sync::{SyncStatus, SyncTally};
use crate::AppState;

#[instrument(skip(state))]
pub async fn trigger_pull(State(state): State<AppState>) -> Result<Json<SyncTally>, ServiceError> {
    Ok(Json(state.sync_service()?.pull().await?))
}

#[instrument(skip(state))]
pub async fn trigger_push(State(state): State<AppState>) -> Result<Json<SyncTally>, ServiceError> {
    Ok(Json(state.sync_service()?.push().await?))
}

#[instrument(skip(state))]
pub async fn trigger_full_sync(
    State(state): State<AppState>,
) -> Result<Json<SyncTally>, ServiceError> {
    Ok(Json(state.sync_service()?.full_sync().await?))
}

pub async fn sync_status(State(state): State<AppState>) -> Result<Json<SyncStatus>, ServiceError> {
    match state.sync.as_deref() {
        Some(sync) => Ok(Json(sync.status().await?)),
        None => Ok(Json(SyncStatus {
            connected: false,
            last_sync_at: None,
            last_tally: None,
            mismatches: Vec::new(),
        })),
    }
}
