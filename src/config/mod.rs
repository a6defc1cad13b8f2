//! Monitor Configuration Module
//!
//! Per-deployment thresholds and runtime settings loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `AQUASENSE_CONFIG` environment variable (path to TOML file)
//! 2. `aquasense.toml` in the current working directory
//! 3. Built-in defaults
//!
//! The loaded config is validated once and then shared read-only
//! (`Arc<MonitorConfig>`) with the engine, watchdog, flusher and API.

mod monitor_config;
pub mod defaults;
pub mod validation;

pub use monitor_config::*;
