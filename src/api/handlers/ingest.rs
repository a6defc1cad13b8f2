//! Ingestion and retrieval endpoints

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::envelope::ApiErrorResponse;
use crate::types::{Anomaly, RawReading, SensorFrame};

use super::ApiState;

/// Acknowledgement for an accepted frame or reading
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub message: String,
    pub anomalies_detected: usize,
    pub anomalies: Vec<Anomaly>,
}

impl IngestResponse {
    fn new(anomalies: Vec<Anomaly>) -> Self {
        Self {
            message: "Data received and processed".to_string(),
            anomalies_detected: anomalies.len(),
            anomalies,
        }
    }
}

/// POST /data - one frame carrying temperature, pressure and flow
pub async fn post_frame(
    State(state): State<ApiState>,
    body: Result<Json<SensorFrame>, JsonRejection>,
) -> Response {
    let Json(frame) = match body {
        Ok(body) => body,
        Err(rejection) => return ApiErrorResponse::invalid_body(&rejection),
    };
    match state.engine.ingest_frame(frame) {
        Ok(outcomes) => {
            let anomalies = outcomes.into_iter().flat_map(|o| o.anomalies).collect();
            Json(IngestResponse::new(anomalies)).into_response()
        }
        Err(e) => ApiErrorResponse::validation(&e),
    }
}

/// POST /readings - a single (sensor, parameter) reading
pub async fn post_reading(
    State(state): State<ApiState>,
    body: Result<Json<RawReading>, JsonRejection>,
) -> Response {
    let Json(raw) = match body {
        Ok(body) => body,
        Err(rejection) => return ApiErrorResponse::invalid_body(&rejection),
    };
    match state.engine.ingest_raw(raw) {
        Ok(outcome) => Json(IngestResponse::new(outcome.anomalies)).into_response(),
        Err(e) => ApiErrorResponse::validation(&e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AnomalyQuery {
    pub limit: Option<usize>,
}

/// GET /anomalies?limit=N - most recent first
pub async fn get_anomalies(
    State(state): State<ApiState>,
    Query(query): Query<AnomalyQuery>,
) -> Json<Vec<Anomaly>> {
    Json(state.engine.list_recent_anomalies(query.limit))
}
