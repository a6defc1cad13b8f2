//! Anomaly records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Parameter;

/// Anomaly category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyKind {
    /// Single reading past a spike threshold
    Spike,
    /// Sustained run of out-of-range readings
    Drift,
    /// No readings for longer than the dropout threshold
    Dropout,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyKind::Spike => write!(f, "spike"),
            AnomalyKind::Drift => write!(f, "drift"),
            AnomalyKind::Dropout => write!(f, "dropout"),
        }
    }
}

/// A detected anomaly. Immutable once appended to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub timestamp: DateTime<Utc>,
    pub sensor_id: String,
    pub parameter: Parameter,
    /// Reading value; last known value for a dropout
    pub value: f64,
    /// Gap length for dropout, deviation window for drift, absent for spike
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    pub message: String,
}

impl Anomaly {
    pub fn spike(
        sensor_id: &str,
        parameter: Parameter,
        value: f64,
        timestamp: DateTime<Utc>,
        high: bool,
    ) -> Self {
        let direction = if high { "high" } else { "low" };
        Self {
            kind: AnomalyKind::Spike,
            timestamp,
            sensor_id: sensor_id.to_string(),
            parameter,
            value,
            duration_seconds: None,
            message: format!(
                "{} spike ({direction}) detected on '{sensor_id}': {value}{}.",
                parameter.label(),
                parameter.unit()
            ),
        }
    }

    pub fn drift(
        sensor_id: &str,
        parameter: Parameter,
        value: f64,
        timestamp: DateTime<Utc>,
        duration_seconds: u64,
        consecutive_readings: u32,
    ) -> Self {
        Self {
            kind: AnomalyKind::Drift,
            timestamp,
            sensor_id: sensor_id.to_string(),
            parameter,
            value,
            duration_seconds: Some(duration_seconds),
            message: format!(
                "{} drift detected on '{sensor_id}': outside normal range for {consecutive_readings} consecutive readings ({duration_seconds}s), last value {value}{}.",
                parameter.label(),
                parameter.unit()
            ),
        }
    }

    pub fn dropout(
        sensor_id: &str,
        parameter: Parameter,
        last_value: f64,
        timestamp: DateTime<Utc>,
        duration_seconds: u64,
        threshold_seconds: u64,
    ) -> Self {
        Self {
            kind: AnomalyKind::Dropout,
            timestamp,
            sensor_id: sensor_id.to_string(),
            parameter,
            value: last_value,
            duration_seconds: Some(duration_seconds),
            message: format!(
                "Dropout detected for '{sensor_id}' {parameter}: no data for {duration_seconds}s (threshold {threshold_seconds}s).",
            ),
        }
    }
}
