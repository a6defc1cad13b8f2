//! Per-key tracking state and the sharded table that owns it
//!
//! The table is a `DashMap` (sharded `RwLock`s) mapping each
//! (sensor, parameter) key to its own `Mutex<TrackingState>`. Lock order is
//! always shard first, released, then key mutex: `slot()` and `slots()` clone
//! the `Arc` out of the map before the caller locks it, so a shard lock is
//! never held while waiting on a key.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::types::{Parameter, SensorReading};

/// One independently tracked telemetry stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SensorKey {
    pub sensor_id: String,
    pub parameter: Parameter,
}

impl SensorKey {
    pub fn new(sensor_id: impl Into<String>, parameter: Parameter) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            parameter,
        }
    }
}

impl From<&SensorReading> for SensorKey {
    fn from(reading: &SensorReading) -> Self {
        Self::new(reading.sensor_id.clone(), reading.parameter)
    }
}

impl fmt::Display for SensorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.sensor_id, self.parameter)
    }
}

/// Mutable bookkeeping for one key, created on its first reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingState {
    pub last_value: f64,
    pub last_seen: DateTime<Utc>,
    /// Length of the current run of out-of-range readings
    pub consecutive_deviation_count: u64,
    /// Set once a dropout has been reported for the current silence
    pub dropout_active: bool,
    /// Earliest timestamp of the current deviation run
    pub run_started_at: Option<DateTime<Utc>>,
}

impl TrackingState {
    pub fn new(reading: &SensorReading) -> Self {
        Self {
            last_value: reading.value,
            last_seen: reading.timestamp,
            consecutive_deviation_count: 0,
            dropout_active: false,
            run_started_at: None,
        }
    }
}

/// Shared handle to one key's state
pub type StateSlot = Arc<Mutex<TrackingState>>;

/// Lock a key's state. A poisoned lock still guards consistent data (every
/// mutation is a plain field store), so the guard is recovered.
pub fn lock_state(slot: &StateSlot) -> MutexGuard<'_, TrackingState> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sharded map from key to state slot. Entries are never removed.
#[derive(Debug, Default)]
pub struct StateTable {
    slots: DashMap<SensorKey, StateSlot>,
}

impl StateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing slot for `key`, if any.
    pub fn slot(&self, key: &SensorKey) -> Option<StateSlot> {
        self.slots.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Slot for `key`, creating it from `init` when the key is new.
    /// Returns the slot and whether it was created by this call.
    pub fn slot_or_insert_with(
        &self,
        key: &SensorKey,
        init: impl FnOnce() -> TrackingState,
    ) -> (StateSlot, bool) {
        if let Some(slot) = self.slot(key) {
            return (slot, false);
        }
        let mut created = false;
        let slot = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| {
                created = true;
                Arc::new(Mutex::new(init()))
            })
            .value()
            .clone();
        (slot, created)
    }

    /// Point-in-time list of every key and its slot.
    pub fn slots(&self) -> Vec<(SensorKey, StateSlot)> {
        self.slots
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(sensor: &str, value: f64) -> SensorReading {
        SensorReading::new(sensor, Parameter::Temperature, value, Utc::now())
    }

    #[test]
    fn test_slot_created_once_per_key() {
        let table = StateTable::new();
        let r = reading("S1", 20.0);
        let key = SensorKey::from(&r);

        let (first, created) = table.slot_or_insert_with(&key, || TrackingState::new(&r));
        assert!(created);
        let (second, created) = table.slot_or_insert_with(&key, || TrackingState::new(&r));
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_keys_differ_by_parameter() {
        let table = StateTable::new();
        let r = reading("S1", 20.0);
        table.slot_or_insert_with(&SensorKey::new("S1", Parameter::Temperature), || {
            TrackingState::new(&r)
        });
        table.slot_or_insert_with(&SensorKey::new("S1", Parameter::Flow), || {
            TrackingState::new(&r)
        });
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_mutation_visible_through_slots() {
        let table = StateTable::new();
        let r = reading("S2", 20.0);
        let key = SensorKey::from(&r);
        let (slot, _) = table.slot_or_insert_with(&key, || TrackingState::new(&r));
        lock_state(&slot).dropout_active = true;

        let slots = table.slots();
        assert_eq!(slots.len(), 1);
        assert!(lock_state(&slots[0].1).dropout_active);
    }
}
