//! Anomaly Detection Engine
//!
//! Single entry point for producers (`ingest*`) and the dropout watchdog
//! (`check_dropouts`). All per-key state lives in a sharded [`StateTable`];
//! every mutation of a key happens under that key's mutex, and anomalies are
//! appended to the [`AnomalyStore`] before the key mutex is released, so the
//! store order for one key always matches the order its readings were
//! accepted.
//!
//! Lock order: key mutex → store lock. The store never calls back into the
//! engine.

pub mod classifier;
pub mod clock;
pub mod drift;
pub mod state;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use classifier::{classify, Classification};
pub use clock::{Clock, ManualClock, SystemClock};
pub use drift::DriftConfirmed;
pub use state::{SensorKey, StateTable, TrackingState};

use crate::config::MonitorConfig;
use crate::storage::AnomalyStore;
use crate::types::{Anomaly, AnomalyKind, RawReading, SensorFrame, SensorReading, ValidationError};

/// Result of one accepted reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    pub classification: Classification,
    /// Spike and/or drift produced by this reading, in append order
    pub anomalies: Vec<Anomaly>,
    /// Timestamp was older than the key's `last_seen`
    pub out_of_order: bool,
}

impl IngestOutcome {
    pub fn is_acknowledgement(&self) -> bool {
        self.anomalies.is_empty()
    }
}

/// Counters since process start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub readings_ingested: u64,
    pub readings_rejected: u64,
    pub out_of_order_readings: u64,
    pub spikes: u64,
    pub drifts: u64,
    pub dropouts: u64,
    pub tracked_keys: usize,
    pub stored_anomalies: usize,
}

#[derive(Debug, Default)]
struct Counters {
    ingested: AtomicU64,
    rejected: AtomicU64,
    out_of_order: AtomicU64,
    spikes: AtomicU64,
    drifts: AtomicU64,
    dropouts: AtomicU64,
}

impl Counters {
    fn record(&self, anomalies: &[Anomaly]) {
        for anomaly in anomalies {
            let counter = match anomaly.kind {
                AnomalyKind::Spike => &self.spikes,
                AnomalyKind::Drift => &self.drifts,
                AnomalyKind::Dropout => &self.dropouts,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }
}

pub struct AnomalyEngine {
    config: Arc<MonitorConfig>,
    states: StateTable,
    store: Arc<AnomalyStore>,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl AnomalyEngine {
    pub fn new(config: Arc<MonitorConfig>, store: Arc<AnomalyStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: Arc<MonitorConfig>,
        store: Arc<AnomalyStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            states: StateTable::new(),
            store,
            clock,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &Arc<MonitorConfig> {
        &self.config
    }

    pub fn store(&self) -> &Arc<AnomalyStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Classify one reading and record whatever it produces.
    ///
    /// A rejected reading touches neither tracking state nor the store.
    pub fn ingest(&self, reading: SensorReading) -> Result<IngestOutcome, ValidationError> {
        if let Err(e) = reading.validate() {
            self.reject(&e);
            return Err(e);
        }
        Ok(self.ingest_validated(reading))
    }

    /// Validate an untrusted wire reading, then ingest it.
    pub fn ingest_raw(&self, raw: RawReading) -> Result<IngestOutcome, ValidationError> {
        match SensorReading::try_from(raw) {
            Ok(reading) => Ok(self.ingest_validated(reading)),
            Err(e) => {
                self.reject(&e);
                Err(e)
            }
        }
    }

    /// Ingest all three readings of a frame. The frame is validated as a
    /// whole first, so a bad frame leaves every key untouched.
    pub fn ingest_frame(&self, frame: SensorFrame) -> Result<Vec<IngestOutcome>, ValidationError> {
        let readings = match frame.into_readings() {
            Ok(readings) => readings,
            Err(e) => {
                self.reject(&e);
                return Err(e);
            }
        };
        Ok(readings
            .into_iter()
            .map(|reading| self.ingest_validated(reading))
            .collect())
    }

    fn reject(&self, error: &ValidationError) {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        debug!(error = %error, "Reading rejected");
    }

    fn ingest_validated(&self, reading: SensorReading) -> IngestOutcome {
        let thresholds = self.config.thresholds.get(reading.parameter);
        let key = SensorKey::from(&reading);
        let (slot, created) = self
            .states
            .slot_or_insert_with(&key, || TrackingState::new(&reading));
        if created {
            debug!(key = %key, "Tracking new sensor stream");
        }

        let mut state = state::lock_state(&slot);

        let classification = classify(reading.value, thresholds);
        let mut anomalies = Vec::new();

        if classification.is_spike() {
            anomalies.push(Anomaly::spike(
                &reading.sensor_id,
                reading.parameter,
                reading.value,
                reading.timestamp,
                classification == Classification::SpikeHigh,
            ));
        }

        if let Some(drift) = drift::observe(&mut state, classification, reading.timestamp, thresholds)
        {
            anomalies.push(Anomaly::drift(
                &reading.sensor_id,
                reading.parameter,
                reading.value,
                reading.timestamp,
                drift.duration_seconds,
                drift.consecutive_readings,
            ));
        }

        let out_of_order = reading.timestamp < state.last_seen;
        if out_of_order {
            self.counters.out_of_order.fetch_add(1, Ordering::Relaxed);
            debug!(
                key = %key,
                timestamp = %reading.timestamp,
                last_seen = %state.last_seen,
                "Out-of-order reading; keeping last_seen"
            );
        } else {
            if state.dropout_active {
                info!(
                    key = %key,
                    silent_secs = (reading.timestamp - state.last_seen).num_seconds(),
                    "Sensor stream resumed"
                );
            }
            state.last_seen = reading.timestamp;
            state.last_value = reading.value;
            state.dropout_active = false;
        }

        self.counters.ingested.fetch_add(1, Ordering::Relaxed);
        self.counters.record(&anomalies);
        self.store.append_all(anomalies.clone());
        drop(state);

        for anomaly in &anomalies {
            log_anomaly(anomaly);
        }

        IngestOutcome {
            classification,
            anomalies,
            out_of_order,
        }
    }

    /// One watchdog scan: report every key silent for at least its dropout
    /// threshold and not already reported for the current silence.
    pub fn check_dropouts(&self, now: DateTime<Utc>) -> Vec<Anomaly> {
        let mut emitted = Vec::new();

        for (key, slot) in self.states.slots() {
            let thresholds = self.config.thresholds.get(key.parameter);
            let mut state = state::lock_state(&slot);
            if state.dropout_active {
                continue;
            }

            // Negative elapsed (reading stamped in the future) never qualifies
            let Ok(elapsed) = u64::try_from((now - state.last_seen).num_seconds()) else {
                continue;
            };
            if elapsed < thresholds.dropout_threshold_seconds {
                continue;
            }

            let anomaly = Anomaly::dropout(
                &key.sensor_id,
                key.parameter,
                state.last_value,
                now,
                elapsed,
                thresholds.dropout_threshold_seconds,
            );
            state.dropout_active = true;
            self.store.append(anomaly.clone());
            drop(state);

            self.counters.dropouts.fetch_add(1, Ordering::Relaxed);
            log_anomaly(&anomaly);
            emitted.push(anomaly);
        }

        emitted
    }

    /// Most recent anomalies first, bounded by `limit` (config default when
    /// `None`) and by the retention window relative to the engine clock.
    pub fn list_recent_anomalies(&self, limit: Option<usize>) -> Vec<Anomaly> {
        let limit = limit.unwrap_or(self.config.storage.default_recent_limit);
        // A window reaching past the representable date range filters nothing
        let cutoff = self
            .config
            .storage
            .retention()
            .and_then(|window| chrono::Duration::from_std(window).ok())
            .and_then(|window| self.clock.now().checked_sub_signed(window));
        match cutoff {
            Some(cutoff) => self.store.recent_since(cutoff, limit),
            None => self.store.recent(limit),
        }
    }

    /// Full anomaly log in append order.
    pub fn snapshot(&self) -> Vec<Anomaly> {
        self.store.snapshot()
    }

    /// Every key seen so far, sorted.
    pub fn tracked_keys(&self) -> Vec<SensorKey> {
        let mut keys: Vec<SensorKey> = self.states.slots().into_iter().map(|(k, _)| k).collect();
        keys.sort();
        keys
    }

    /// Copy of one key's state.
    pub fn tracking_state(&self, key: &SensorKey) -> Option<TrackingState> {
        self.states
            .slot(key)
            .map(|slot| state::lock_state(&slot).clone())
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            readings_ingested: self.counters.ingested.load(Ordering::Relaxed),
            readings_rejected: self.counters.rejected.load(Ordering::Relaxed),
            out_of_order_readings: self.counters.out_of_order.load(Ordering::Relaxed),
            spikes: self.counters.spikes.load(Ordering::Relaxed),
            drifts: self.counters.drifts.load(Ordering::Relaxed),
            dropouts: self.counters.dropouts.load(Ordering::Relaxed),
            tracked_keys: self.states.len(),
            stored_anomalies: self.store.len(),
        }
    }
}

fn log_anomaly(anomaly: &Anomaly) {
    warn!(
        kind = %anomaly.kind,
        sensor_id = %anomaly.sensor_id,
        parameter = %anomaly.parameter,
        value = anomaly.value,
        duration_seconds = ?anomaly.duration_seconds,
        "{}",
        anomaly.message
    );
}
