use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::errors::ServiceError;
use crate::webhooks::constant_time_eq;
use crate::AppState;

pub mod inventory;
pub mod orders;
pub mod sales;
pub mod sync;
pub mod webhooks;

/// Gate for privileged routes (manual sync triggers, reconciliation).
/// Requires the configured bearer token; with no token configured the
/// routes are open in development and rejected everywhere else.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    match state.config.admin_api_token.as_deref() {
        Some(expected) => {
            let provided = request
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .unwrap_or_default();
            if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
                warn!(path = %request.uri().path(), "Rejected privileged request with bad token");
                return Err(ServiceError::Unauthorized(
                    "Invalid or missing admin token".to_string(),
                ));
            }
        }
        None => {
            if !state.config.is_development() {
                return Err(ServiceError::Unauthorized(
                    "Admin token is not configured".to_string(),
                ));
            }
            warn!(path = %request.uri().path(), "Privileged route used without admin token (development)");
        }
    }

    Ok(next.run(request).await)
}
