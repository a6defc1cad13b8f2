//! In-memory, append-only anomaly log
//!
//! Appends take the write lock, reads clone under the read lock, so every
//! snapshot is a consistent prefix of the append order. The log never shrinks;
//! durability is handled separately by `StoreFlusher` + an `AnomalySink`.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Notify;

use crate::types::Anomaly;

#[derive(Debug, Default)]
pub struct AnomalyStore {
    log: RwLock<Vec<Anomaly>>,
    /// Number of leading records known to be on durable storage
    flushed: AtomicUsize,
    appended: Notify,
}

impl AnomalyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with recovered history, all of it considered flushed.
    pub fn with_history(history: Vec<Anomaly>) -> Self {
        let flushed = history.len();
        Self {
            log: RwLock::new(history),
            flushed: AtomicUsize::new(flushed),
            appended: Notify::new(),
        }
    }

    // Poisoning can only follow a panic inside Vec::push/clone; the Vec is
    // still valid, so recover the guard rather than failing retrieval.
    fn read(&self) -> RwLockReadGuard<'_, Vec<Anomaly>> {
        self.log.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Anomaly>> {
        self.log.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one anomaly; returns its position in the log.
    pub fn append(&self, anomaly: Anomaly) -> usize {
        let seq = {
            let mut log = self.write();
            log.push(anomaly);
            log.len() - 1
        };
        self.appended.notify_one();
        seq
    }

    /// Append a batch atomically: readers see all of it or none of it.
    pub fn append_all(&self, anomalies: Vec<Anomaly>) {
        if anomalies.is_empty() {
            return;
        }
        self.write().extend(anomalies);
        self.appended.notify_one();
    }

    /// Copy of the full log in append order.
    pub fn snapshot(&self) -> Vec<Anomaly> {
        self.read().clone()
    }

    /// Up to `limit` anomalies, most recent first.
    pub fn recent(&self, limit: usize) -> Vec<Anomaly> {
        self.read().iter().rev().take(limit).cloned().collect()
    }

    /// Up to `limit` anomalies stamped at or after `cutoff`, most recent first.
    pub fn recent_since(&self, cutoff: DateTime<Utc>, limit: usize) -> Vec<Anomaly> {
        self.read()
            .iter()
            .rev()
            .filter(|a| a.timestamp >= cutoff)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn flushed_len(&self) -> usize {
        self.flushed.load(Ordering::Acquire)
    }

    /// Record that the first `len` anomalies are durable. Never moves backwards.
    pub fn mark_flushed(&self, len: usize) {
        self.flushed.fetch_max(len, Ordering::AcqRel);
    }

    /// Whether anything has been appended since the last successful flush.
    pub fn is_dirty(&self) -> bool {
        self.len() > self.flushed_len()
    }

    /// Resolves after the next append (or immediately if one happened since
    /// the last wait).
    pub async fn appended(&self) {
        self.appended.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Parameter;
    use chrono::Duration;
    use std::sync::Arc;

    fn spike(sensor: &str, at: DateTime<Utc>) -> Anomaly {
        Anomaly::spike(sensor, Parameter::Pressure, 9.0, at, true)
    }

    #[test]
    fn test_recent_is_newest_first_and_bounded() {
        let store = AnomalyStore::new();
        let now = Utc::now();
        for i in 0..5 {
            store.append(spike(&format!("S{i}"), now));
        }
        let recent = store.recent(3);
        let ids: Vec<_> = recent.iter().map(|a| a.sensor_id.as_str()).collect();
        assert_eq!(ids, ["S4", "S3", "S2"]);
        assert_eq!(store.recent(100).len(), 5);
    }

    #[test]
    fn test_empty_store_returns_empty_sequences() {
        let store = AnomalyStore::new();
        assert!(store.snapshot().is_empty());
        assert!(store.recent(10).is_empty());
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let store = AnomalyStore::new();
        store.append(spike("S1", Utc::now()));
        let before = store.snapshot();
        store.append(spike("S2", Utc::now()));
        assert_eq!(before.len(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_recent_since_filters_old_entries() {
        let store = AnomalyStore::new();
        let now = Utc::now();
        store.append(spike("old", now - Duration::seconds(600)));
        store.append(spike("new", now));
        let recent = store.recent_since(now - Duration::seconds(120), 10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].sensor_id, "new");
    }

    #[test]
    fn test_flush_watermark() {
        let store = AnomalyStore::with_history(vec![spike("S1", Utc::now())]);
        assert!(!store.is_dirty());
        store.append(spike("S2", Utc::now()));
        assert!(store.is_dirty());
        store.mark_flushed(2);
        store.mark_flushed(1);
        assert_eq!(store.flushed_len(), 2);
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_concurrent_appends_lose_nothing() {
        let store = Arc::new(AnomalyStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        store.append(spike(&format!("T{t}-{i}"), Utc::now()));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2000);
        let unique: std::collections::HashSet<_> =
            snapshot.iter().map(|a| a.sensor_id.clone()).collect();
        assert_eq!(unique.len(), 2000);
    }

    #[tokio::test]
    async fn test_append_wakes_waiter() {
        let store = Arc::new(AnomalyStore::new());
        store.append(spike("S1", Utc::now()));
        // permit stored by notify_one resolves immediately
        tokio::time::timeout(std::time::Duration::from_secs(1), store.appended())
            .await
            .unwrap();
    }
}
