//! Drift tracker: turns sustained deviation runs into confirmed drifts.
//!
//! Fires once per uninterrupted run, on the reading that brings the run
//! length to exactly `drift_consecutive_readings`. Further deviating readings
//! keep extending the run without re-firing; only a Normal reading resets it.

use chrono::{DateTime, Utc};

use super::classifier::Classification;
use super::state::TrackingState;
use crate::config::ParameterThresholds;

/// A deviation run that just reached the drift threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriftConfirmed {
    /// Seconds between the first and current reading of the run
    pub duration_seconds: u64,
    pub consecutive_readings: u32,
}

/// Apply one classification to the run counter.
pub fn observe(
    state: &mut TrackingState,
    classification: Classification,
    timestamp: DateTime<Utc>,
    thresholds: &ParameterThresholds,
) -> Option<DriftConfirmed> {
    if !classification.is_deviation() {
        state.consecutive_deviation_count = 0;
        state.run_started_at = None;
        return None;
    }

    let run_start = match state.run_started_at {
        Some(start) if state.consecutive_deviation_count > 0 => start.min(timestamp),
        _ => timestamp,
    };
    state.run_started_at = Some(run_start);
    state.consecutive_deviation_count = state.consecutive_deviation_count.saturating_add(1);

    let required = thresholds.drift_consecutive_readings;
    if state.consecutive_deviation_count != u64::from(required) {
        return None;
    }

    let duration_seconds = u64::try_from((timestamp - run_start).num_seconds()).unwrap_or(0);
    Some(DriftConfirmed {
        duration_seconds,
        consecutive_readings: required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Parameter, SensorReading};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn state() -> TrackingState {
        TrackingState::new(&SensorReading::new("S1", Parameter::Temperature, 20.0, t0()))
    }

    fn thresholds(n: u32) -> ParameterThresholds {
        ParameterThresholds::new(0.0, 10.0, 30.0, 50.0).with_drift_readings(n)
    }

    #[test]
    fn test_fires_exactly_at_threshold() {
        let mut s = state();
        let t = thresholds(3);
        assert!(observe(&mut s, Classification::OutOfRange, t0(), &t).is_none());
        assert!(observe(&mut s, Classification::OutOfRange, t0() + Duration::seconds(1), &t).is_none());
        let drift = observe(&mut s, Classification::OutOfRange, t0() + Duration::seconds(2), &t)
            .expect("third deviation confirms drift");
        assert_eq!(drift.duration_seconds, 2);
        assert_eq!(drift.consecutive_readings, 3);
    }

    #[test]
    fn test_fires_once_per_run() {
        let mut s = state();
        let t = thresholds(2);
        let mut fired = 0;
        for i in 0..10 {
            if observe(&mut s, Classification::OutOfRange, t0() + Duration::seconds(i), &t).is_some() {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
        assert_eq!(s.consecutive_deviation_count, 10);
    }

    #[test]
    fn test_normal_reading_rearms() {
        let mut s = state();
        let t = thresholds(2);
        observe(&mut s, Classification::OutOfRange, t0(), &t);
        assert!(observe(&mut s, Classification::OutOfRange, t0(), &t).is_some());
        observe(&mut s, Classification::Normal, t0(), &t);
        assert_eq!(s.consecutive_deviation_count, 0);
        assert!(s.run_started_at.is_none());
        observe(&mut s, Classification::SpikeHigh, t0(), &t);
        assert!(observe(&mut s, Classification::OutOfRange, t0(), &t).is_some());
    }

    #[test]
    fn test_single_reading_threshold_fires_with_zero_duration() {
        let mut s = state();
        let drift = observe(&mut s, Classification::SpikeLow, t0(), &thresholds(1)).unwrap();
        assert_eq!(drift.duration_seconds, 0);
    }

    #[test]
    fn test_out_of_order_reading_moves_run_start_back() {
        let mut s = state();
        let t = thresholds(3);
        observe(&mut s, Classification::OutOfRange, t0() + Duration::seconds(5), &t);
        observe(&mut s, Classification::OutOfRange, t0(), &t);
        let drift = observe(&mut s, Classification::OutOfRange, t0() + Duration::seconds(6), &t).unwrap();
        assert_eq!(drift.duration_seconds, 6);
    }
}
