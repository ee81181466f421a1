//! Liveness and readiness checks

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{error::AppResult, AppState};

#[derive(Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    /// "healthy" for liveness, "ready" once storage answers
    pub status: String,
    pub version: String,
    /// Storage backend in use (postgres or memory)
    pub storage: String,
}

impl StatusResponse {
    fn new(status: &str, state: &AppState) -> Self {
        Self {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            storage: state.config.storage.backend.as_str().to_string(),
        }
    }
}

/// Liveness check, never touches storage
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Process is up", body = StatusResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse::new("healthy", &state))
}

/// Readiness check: fails with 503 while the ledger store is unreachable
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "Storage reachable", body = StatusResponse),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn readiness_check(State(state): State<AppState>) -> AppResult<Json<StatusResponse>> {
    state.services.ping().await?;
    Ok(Json(StatusResponse::new("ready", &state)))
}
