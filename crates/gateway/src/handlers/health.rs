//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub store: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness probe
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: robodigest_common::VERSION,
    })
}

/// Readiness probe; pings the store
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let start = std::time::Instant::now();

    let (code, store) = match state.aggregator.store().ping().await {
        Ok(()) => (
            StatusCode::OK,
            CheckResult {
                status: "up",
                latency_ms: Some(start.elapsed().as_millis() as u64),
                error: None,
            },
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Store ping failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                CheckResult {
                    status: "down",
                    latency_ms: None,
                    error: Some(e.to_string()),
                },
            )
        }
    };

    let status = if code == StatusCode::OK { "ready" } else { "not_ready" };
    (code, Json(ReadyResponse { status, store }))
}
