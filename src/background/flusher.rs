//! Store Flusher - copies the in-memory anomaly log to its durable sink
//!
//! Triggers: every `flush_interval_secs`, and on each append when
//! `flush_on_append` is set. A flush is skipped when nothing was appended
//! since the last success. A failed flush leaves the watermark where it was,
//! so the next trigger retries the same records; ingestion is never blocked.
//! Anomalies appended after the last successful flush are lost on a crash.
//!
//! On graceful shutdown the flusher must outlive every producer: the binary
//! `spawn`s it under a private token and calls [`FlusherHandle::shutdown`]
//! only once the HTTP server, watchdog and ingest loop have stopped, so the
//! final flush sees every anomaly that was acknowledged.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::storage::{AnomalySink, AnomalyStore, PersistenceError};

pub struct StoreFlusher {
    store: Arc<AnomalyStore>,
    sink: Arc<dyn AnomalySink>,
    interval: Duration,
    on_append: bool,
}

impl StoreFlusher {
    pub fn new(store: Arc<AnomalyStore>, sink: Arc<dyn AnomalySink>, config: &StorageConfig) -> Self {
        Self {
            store,
            sink,
            interval: Duration::from_secs(config.flush_interval_secs.max(1)),
            on_append: config.flush_on_append,
        }
    }

    /// Persist the current snapshot if the store is dirty.
    /// Returns the number of records now durable.
    pub async fn flush_now(&self) -> Result<usize, PersistenceError> {
        if !self.store.is_dirty() {
            debug!("Anomaly store clean; flush skipped");
            return Ok(self.store.flushed_len());
        }

        let snapshot = self.store.snapshot();
        let len = snapshot.len();
        let sink = Arc::clone(&self.sink);
        tokio::task::spawn_blocking(move || sink.persist(&snapshot))
            .await
            .map_err(|e| PersistenceError::Background(e.to_string()))??;

        self.store.mark_flushed(len);
        debug!(backend = self.sink.backend_name(), records = len, "Anomaly log flushed");
        Ok(len)
    }

    async fn flush_logged(&self) {
        if let Err(e) = self.flush_now().await {
            warn!(
                backend = self.sink.backend_name(),
                pending = self.store.len().saturating_sub(self.store.flushed_len()),
                error = %e,
                "Anomaly flush failed; will retry"
            );
        }
    }

    /// Run on a background task with a token of its own, independent of the
    /// producers' shutdown signal.
    pub fn spawn(self) -> FlusherHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(cancel.clone()));
        FlusherHandle { cancel, task }
    }

    /// Run until cancelled, then flush once more.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            backend = self.sink.backend_name(),
            interval_secs = self.interval.as_secs(),
            on_append = self.on_append,
            "Anomaly flusher started"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => self.flush_logged().await,
                _ = self.store.appended(), if self.on_append => self.flush_logged().await,
            }
        }

        self.flush_logged().await;
        info!(
            records = self.store.flushed_len(),
            dirty = self.store.is_dirty(),
            "Anomaly flusher stopped"
        );
    }
}

/// Owner of a spawned flusher.
pub struct FlusherHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl FlusherHandle {
    /// Stop the flusher and wait for its final flush. Call only after every
    /// producer that appends to the store has finished.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Anomaly flusher task failed during shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::JsonFileSink;
    use crate::types::{Anomaly, Parameter};
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlakySink {
        fail: AtomicBool,
        inner: JsonFileSink,
    }

    impl AnomalySink for FlakySink {
        fn persist(&self, anomalies: &[Anomaly]) -> Result<(), PersistenceError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(PersistenceError::Io(std::io::Error::other("disk full")));
            }
            self.inner.persist(anomalies)
        }

        fn load(&self) -> Result<Vec<Anomaly>, PersistenceError> {
            self.inner.load()
        }

        fn backend_name(&self) -> &'static str {
            "flaky"
        }
    }

    fn spike() -> Anomaly {
        Anomaly::spike("S1", Parameter::Temperature, 60.0, Utc::now(), true)
    }

    #[tokio::test]
    async fn test_flush_writes_and_clears_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(AnomalyStore::new());
        let sink = Arc::new(JsonFileSink::new(dir.path().join("anomalies.json")));
        let flusher = StoreFlusher::new(store.clone(), sink.clone(), &StorageConfig::default());

        store.append(spike());
        assert_eq!(flusher.flush_now().await.unwrap(), 1);
        assert!(!store.is_dirty());
        assert_eq!(sink.load().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_flush_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(AnomalyStore::new());
        let sink = Arc::new(FlakySink {
            fail: AtomicBool::new(true),
            inner: JsonFileSink::new(dir.path().join("anomalies.json")),
        });
        let flusher = StoreFlusher::new(store.clone(), sink.clone(), &StorageConfig::default());

        store.append(spike());
        assert!(flusher.flush_now().await.is_err());
        assert!(store.is_dirty());

        sink.fail.store(false, Ordering::SeqCst);
        store.append(spike());
        assert_eq!(flusher.flush_now().await.unwrap(), 2);
        assert_eq!(sink.load().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_run_flushes_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(AnomalyStore::new());
        let sink = Arc::new(JsonFileSink::new(dir.path().join("anomalies.json")));
        let config = StorageConfig {
            flush_interval_secs: 3600,
            flush_on_append: false,
            ..StorageConfig::default()
        };
        let flusher = StoreFlusher::new(store.clone(), sink.clone(), &config);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(flusher.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.append(spike());
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(sink.load().unwrap().len(), 1);
        assert!(!store.is_dirty());
    }

    #[tokio::test]
    async fn test_handle_shutdown_persists_late_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(AnomalyStore::new());
        let sink = Arc::new(JsonFileSink::new(dir.path().join("anomalies.json")));
        let config = StorageConfig {
            flush_interval_secs: 3600,
            flush_on_append: false,
            ..StorageConfig::default()
        };
        let handle = StoreFlusher::new(store.clone(), sink.clone(), &config).spawn();

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.append(spike());
        store.append(spike());

        handle.shutdown().await;
        assert_eq!(sink.load().unwrap().len(), 2);
        assert!(!store.is_dirty());
    }
}
