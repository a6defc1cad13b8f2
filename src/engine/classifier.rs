//! Threshold classifier
//!
//! Evaluated in fixed order, first match wins:
//! 1. `value >= spike_high` → SpikeHigh, `value <= spike_low` → SpikeLow
//! 2. `normal_min <= value <= normal_max` → Normal
//! 3. anything else → OutOfRange
//!
//! Spikes lie outside the normal band too, so they still count as
//! deviations for drift bookkeeping.

use serde::Serialize;

use crate::config::ParameterThresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Normal,
    SpikeHigh,
    SpikeLow,
    OutOfRange,
}

impl Classification {
    pub fn is_spike(self) -> bool {
        matches!(self, Classification::SpikeHigh | Classification::SpikeLow)
    }

    /// Whether the reading extends (or starts) a deviation run.
    pub fn is_deviation(self) -> bool {
        self != Classification::Normal
    }
}

/// Classify one value. Bounds are inclusive everywhere; no clamping.
pub fn classify(value: f64, thresholds: &ParameterThresholds) -> Classification {
    if value >= thresholds.spike_high {
        Classification::SpikeHigh
    } else if value <= thresholds.spike_low {
        Classification::SpikeLow
    } else if (thresholds.normal_min..=thresholds.normal_max).contains(&value) {
        Classification::Normal
    } else {
        Classification::OutOfRange
    }
}
