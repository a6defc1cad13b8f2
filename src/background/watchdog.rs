//! Dropout Watchdog - periodic silence scan over every tracked key
//!
//! Tick interval defaults to a tenth of the smallest dropout threshold so
//! detection latency stays well under the threshold itself. Cancellation is
//! observed only between ticks: a scan that has started always finishes, so
//! no dropout is half-recorded on shutdown.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::AnomalyEngine;

pub struct DropoutWatchdog {
    engine: Arc<AnomalyEngine>,
    interval: Duration,
}

impl DropoutWatchdog {
    pub fn new(engine: Arc<AnomalyEngine>) -> Self {
        let interval = engine.config().watchdog_tick();
        Self { engine, interval }
    }

    pub fn with_interval(engine: Arc<AnomalyEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One scan at the engine clock's current time; returns dropouts emitted.
    pub fn tick(&self) -> usize {
        let now = self.engine.clock().now();
        let emitted = self.engine.check_dropouts(now).len();
        if emitted > 0 {
            debug!(emitted, "Watchdog scan reported dropouts");
        }
        emitted
    }

    /// Run until cancelled. Returns the number of completed scans.
    pub async fn run(self, cancel: CancellationToken) -> u64 {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Dropout watchdog started"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut scans = 0u64;
        let mut reported = 0usize;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(scans, dropouts = reported, "Dropout watchdog stopped");
                    return scans;
                }
                _ = interval.tick() => {
                    reported += self.tick();
                    scans += 1;
                }
            }
        }
    }
}
