//! AnomalySink trait - pluggable durable backend for the anomaly log
//!
//! - `JsonFileSink`: the whole log as a pretty JSON array (`anomalies.json`),
//!   readable by any downstream consumer without the engine
//! - `SledSink`: one sled record per anomaly, keyed by big-endian position
//!
//! Both reload to the exact ordered sequence that was persisted.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{StorageBackend, StorageConfig};
use crate::types::Anomaly;

/// Durable storage for the anomaly log.
///
/// Implementations must be thread-safe (Send + Sync); `persist` is called from
/// a blocking task while ingestion continues.
pub trait AnomalySink: Send + Sync {
    /// Persist the full ordered log. `anomalies` always extends what was
    /// passed to the previous successful call.
    fn persist(&self, anomalies: &[Anomaly]) -> Result<(), PersistenceError>;

    /// Load everything previously persisted, in order.
    fn load(&self) -> Result<Vec<Anomaly>, PersistenceError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Persistence errors. Never surfaced to `ingest`; the flusher logs them and
/// retries on its next trigger.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt anomaly data at {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("database error: {0}")]
    Database(#[from] sled::Error),

    #[error("flush task failed: {0}")]
    Background(String),

    #[error("data directory locked by running process {pid} ({})", .path.display())]
    Locked { pid: u32, path: PathBuf },
}

/// Open the backend selected in config.
pub fn open_sink(config: &StorageConfig) -> Result<Arc<dyn AnomalySink>, PersistenceError> {
    let path = config.anomalies_path();
    let sink: Arc<dyn AnomalySink> = match config.backend {
        StorageBackend::Json => Arc::new(JsonFileSink::new(path)),
        StorageBackend::Sled => Arc::new(SledSink::open(path)?),
    };
    info!(backend = sink.backend_name(), path = %config.anomalies_path().display(), "Anomaly sink opened");
    Ok(sink)
}

// ============================================================================
// JSON file
// ============================================================================

/// Rewrites the complete log on every persist via write-to-temp + rename, so
/// a reader never sees a half-written file.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl AnomalySink for JsonFileSink {
    fn persist(&self, anomalies: &[Anomaly]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_vec_pretty(anomalies)?;
        let tmp = self.temp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            // contents must be on disk before the rename makes them visible
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), count = anomalies.len(), "Anomalies written");
        Ok(())
    }

    fn load(&self) -> Result<Vec<Anomaly>, PersistenceError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No anomaly file yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&contents).map_err(|e| PersistenceError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    fn backend_name(&self) -> &'static str {
        "json"
    }
}

// ============================================================================
// Sled
// ============================================================================

/// Key: position in the log as u64 big-endian (sorts in append order)
/// Value: JSON-serialized Anomaly
///
/// Only records beyond what the tree already holds are written on each
/// persist, followed by an explicit flush. The record count is read from the
/// tree once at open (`Db::len` walks the whole tree) and tracked after that.
#[derive(Clone)]
pub struct SledSink {
    db: sled::Db,
    path: PathBuf,
    stored: Arc<AtomicUsize>,
}

impl SledSink {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let db = sled::open(&path)?;
        let stored = Arc::new(AtomicUsize::new(db.len()));
        Ok(Self { db, path, stored })
    }

    /// Records durable in the tree.
    pub fn count(&self) -> usize {
        self.stored.load(Ordering::Acquire)
    }
}

impl AnomalySink for SledSink {
    fn persist(&self, anomalies: &[Anomaly]) -> Result<(), PersistenceError> {
        let stored = self.count();
        let mut written = 0usize;
        for (seq, anomaly) in anomalies.iter().enumerate().skip(stored) {
            let key = (seq as u64).to_be_bytes();
            self.db.insert(key, serde_json::to_vec(anomaly)?)?;
            written += 1;
        }
        if written > 0 {
            self.db.flush()?;
            self.stored.store(stored + written, Ordering::Release);
        }
        debug!(path = %self.path.display(), written, total = anomalies.len(), "Anomalies written");
        Ok(())
    }

    fn load(&self) -> Result<Vec<Anomaly>, PersistenceError> {
        let mut anomalies = Vec::with_capacity(self.count());
        for item in self.db.iter() {
            let (_key, value) = item?;
            let anomaly = serde_json::from_slice(&value).map_err(|e| PersistenceError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
            anomalies.push(anomaly);
        }
        Ok(anomalies)
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}
