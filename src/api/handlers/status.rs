//! Service state endpoints: status, health

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::EngineStats;

use super::ApiState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: u64,
    pub tracked_keys: usize,
    pub stats: EngineStats,
    /// Anomalies appended but not yet on durable storage
    pub unflushed_anomalies: usize,
}

/// GET /status
pub async fn get_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let stats = state.engine.stats();
    let store = state.engine.store();
    Json(StatusResponse {
        status: "ok",
        service: "anomaly_detector",
        timestamp: Utc::now(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        tracked_keys: stats.tracked_keys,
        stats,
        unflushed_anomalies: store.len().saturating_sub(store.flushed_len()),
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET /health - liveness only
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
