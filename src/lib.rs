//! AquaSense: real-time anomaly detection for water-network sensor telemetry
//!
//! ## Architecture
//!
//! - **Engine**: per-(sensor, parameter) classification into spike / drift,
//!   sharded key-scoped tracking state
//! - **Background**: dropout watchdog and periodic anomaly flusher
//! - **Storage**: append-only in-memory anomaly log plus JSON / sled sinks
//! - **Pipeline / API**: JSON-lines and HTTP producers feeding the engine

pub mod api;
pub mod background;
pub mod config;
pub mod engine;
pub mod pipeline;
pub mod storage;
pub mod types;

// Re-export configuration
pub use config::{ConfigError, MonitorConfig, ParameterThresholds, ThresholdTable};

// Re-export commonly used types
pub use types::{Anomaly, AnomalyKind, Parameter, RawReading, SensorFrame, SensorReading, ValidationError};

// Re-export engine
pub use engine::{AnomalyEngine, Classification, EngineStats, IngestOutcome, SensorKey};

// Re-export storage
pub use storage::{AnomalySink, AnomalyStore, PersistenceError};

// Re-export background tasks
pub use background::{DropoutWatchdog, StoreFlusher};
