//! API route handlers
//!
//! - Ingestion: frames and single readings
//! - Retrieval: recent anomalies
//! - Status and liveness

mod ingest;
mod status;

pub use ingest::*;
pub use status::*;

use std::sync::Arc;
use std::time::Instant;

use crate::engine::AnomalyEngine;

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<AnomalyEngine>,
    /// Service start, for uptime reporting
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(engine: Arc<AnomalyEngine>) -> Self {
        Self {
            engine,
            started_at: Instant::now(),
        }
    }
}
