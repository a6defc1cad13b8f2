//! API route definitions
//!
//! - POST /data       - three-parameter sensor frame
//! - POST /readings   - single reading
//! - GET  /anomalies  - recent anomalies (`?limit=N`)
//! - GET  /status     - engine counters
//! - GET  /health     - liveness

use axum::{routing::{get, post}, Router};

use super::handlers::{self, ApiState};

pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/data", post(handlers::post_frame))
        .route("/readings", post(handlers::post_reading))
        .route("/anomalies", get(handlers::get_anomalies))
        .route("/status", get(handlers::get_status))
        .route("/health", get(handlers::health))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::engine::AnomalyEngine;
    use crate::storage::AnomalyStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn create_test_state() -> ApiState {
        ApiState::new(Arc::new(AnomalyEngine::new(
            Arc::new(MonitorConfig::default()),
            Arc::new(AnomalyStore::new()),
        )))
    }

    #[tokio::test]
    async fn test_api_routes_health() {
        let app = api_routes(create_test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_routes_status() {
        let app = api_routes(create_test_state());
        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_routes_anomalies_empty() {
        let app = api_routes(create_test_state());
        let response = app
            .oneshot(Request::builder().uri("/anomalies").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"[]");
    }
}
