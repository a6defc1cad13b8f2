//! Shared data structures for sensor telemetry anomaly detection
//!
//! - `SensorReading`: one validated (sensor, parameter, value, timestamp) sample
//! - `RawReading` / `SensorFrame`: untrusted wire shapes, validated on ingest
//! - `Anomaly`: immutable record of a detected spike, drift or dropout

mod reading;
mod anomaly;

pub use reading::*;
pub use anomaly::*;
