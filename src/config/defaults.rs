//! System-wide default constants.
//!
//! Grouped by subsystem. Threshold defaults reproduce the AquaSense sensor
//! normal ranges, with spike bands placed outside them.

// ============================================================================
// Temperature (°C)
// ============================================================================

pub const TEMP_SPIKE_LOW: f64 = 0.0;
pub const TEMP_NORMAL_MIN: f64 = 10.0;
pub const TEMP_NORMAL_MAX: f64 = 35.0;
pub const TEMP_SPIKE_HIGH: f64 = 50.0;

// ============================================================================
// Pressure (bar)
// ============================================================================

pub const PRESSURE_SPIKE_LOW: f64 = 0.5;
pub const PRESSURE_NORMAL_MIN: f64 = 1.0;
pub const PRESSURE_NORMAL_MAX: f64 = 3.0;
pub const PRESSURE_SPIKE_HIGH: f64 = 4.5;

// ============================================================================
// Flow (L/min)
// ============================================================================

pub const FLOW_SPIKE_LOW: f64 = 5.0;
pub const FLOW_NORMAL_MIN: f64 = 20.0;
pub const FLOW_NORMAL_MAX: f64 = 100.0;
pub const FLOW_SPIKE_HIGH: f64 = 150.0;

// ============================================================================
// Drift / Dropout
// ============================================================================

/// Consecutive out-of-range readings that confirm a drift.
///
/// 8 readings at the 2 s sensor cadence = 16 s of sustained deviation.
pub const DRIFT_CONSECUTIVE_READINGS: u32 = 8;

/// Silence before a dropout is reported (seconds).
pub const DROPOUT_THRESHOLD_SECS: u64 = 10;

/// Longest accepted dropout threshold (seconds): one year.
pub const MAX_DROPOUT_THRESHOLD_SECS: u64 = 365 * 86_400;

/// Watchdog tick as a fraction of the smallest dropout threshold.
pub const WATCHDOG_TICK_DIVISOR: u64 = 10;

/// Lower bound on the derived watchdog tick (ms).
pub const WATCHDOG_MIN_TICK_MS: u64 = 100;

// ============================================================================
// Storage
// ============================================================================

pub const DATA_DIR: &str = "data";

pub const ANOMALIES_FILE: &str = "anomalies.json";

/// Periodic flush interval for the anomaly store (seconds).
pub const FLUSH_INTERVAL_SECS: u64 = 5;

/// Default size of the "most recent" retrieval window.
pub const DEFAULT_RECENT_LIMIT: usize = 100;

/// Age beyond which anomalies drop out of recent-anomaly retrieval (seconds).
pub const RETENTION_SECS: u64 = 120;

/// Longest accepted retention window (seconds): one hundred years.
pub const MAX_RETENTION_SECS: u64 = 100 * 365 * 86_400;

// ============================================================================
// Server
// ============================================================================

pub const SERVER_ADDR: &str = "0.0.0.0:8001";
