//! Fetch trigger, cancel and progress handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use robodigest_common::{errors::Result, ProgressSnapshot, SourceKind};
use robodigest_ingestion::TriggerResponse;
use serde::Serialize;
use tracing::info;

use super::parse_kind;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub kind: SourceKind,
    pub cancelled: bool,
}

/// Start a pass: 202 when accepted, 409 with the live progress otherwise
pub async fn trigger(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<(StatusCode, Json<TriggerResponse>)> {
    let kind = parse_kind(&kind)?;
    let response = state.aggregator.trigger_fetch(kind)?;
    let status = if response.accepted {
        info!(%kind, "Fetch accepted");
        StatusCode::ACCEPTED
    } else {
        StatusCode::CONFLICT
    };
    Ok((status, Json(response)))
}

pub async fn cancel(State(state): State<AppState>, Path(kind): Path<String>) -> Result<Json<CancelResponse>> {
    let kind = parse_kind(&kind)?;
    let cancelled = state.aggregator.cancel_fetch(kind);
    if cancelled {
        info!(%kind, "Fetch cancel requested");
    }
    Ok(Json(CancelResponse { kind, cancelled }))
}

pub async fn progress(State(state): State<AppState>) -> Json<ProgressSnapshot> {
    Json(state.aggregator.get_progress())
}
