use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub cache: &'static str,
    /// Absent when no distributed tier is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<bool>,
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Never fails: an unreachable distributed tier only degrades caching.
pub async fn readiness_handler(State(state): State<AppState>) -> Json<ReadinessResponse> {
    let redis = match state.redis() {
        Some(link) => Some(link.ping().await),
        None => None,
    };

    Json(ReadinessResponse {
        status: if redis == Some(false) { "degraded" } else { "ready" },
        cache: state.router().cache().name(),
        redis,
    })
}
