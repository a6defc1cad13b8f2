//! REST API module using Axum
//!
//! Thin HTTP surface over the engine: readings in, anomalies and status out.

pub mod envelope;
pub mod handlers;
mod routes;

pub use handlers::ApiState;

use axum::http::{header, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Comma-separated list of allowed cross-origin callers
pub const CORS_ENV_VAR: &str = "AQUASENSE_CORS_ORIGINS";

/// Same-origin only unless `AQUASENSE_CORS_ORIGINS` lists allowed origins.
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);
    match std::env::var(CORS_ENV_VAR) {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base,
    }
}

/// Create the complete application router.
pub fn create_app(state: ApiState) -> Router {
    routes::api_routes(state)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}
