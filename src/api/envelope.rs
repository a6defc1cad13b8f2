//! Uniform error body for every API endpoint.
//!
//! `{ "error": { "code": "...", "message": "..." }, "meta": { "timestamp": "..." } }`

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;

use crate::types::ValidationError;

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub timestamp: String,
}

impl Default for ResponseMeta {
    fn default() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub error: ErrorDetail,
    pub meta: ResponseMeta,
}

impl ApiErrorResponse {
    fn build(status: StatusCode, code: &str, msg: impl Into<String>) -> Response {
        let body = Self {
            error: ErrorDetail {
                code: code.to_string(),
                message: msg.into(),
            },
            meta: ResponseMeta::default(),
        };
        (status, axum::Json(body)).into_response()
    }

    /// 422: the reading parsed but failed domain validation
    pub fn validation(err: &ValidationError) -> Response {
        Self::build(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", err.to_string())
    }

    /// Body could not be decoded; keeps axum's status (400/415/422)
    pub fn invalid_body(rejection: &JsonRejection) -> Response {
        Self::build(rejection.status(), "INVALID_BODY", rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_validation_error_shape() {
        let resp = ApiErrorResponse::validation(&ValidationError::EmptySensorId);
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(v["error"]["message"], "sensor_id must not be empty");
        assert!(v["meta"]["timestamp"].is_string());
    }
}
