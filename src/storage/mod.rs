//! Anomaly storage
//!
//! `AnomalyStore` is the authoritative in-memory log; an `AnomalySink` makes
//! it durable. The two are joined only by `background::StoreFlusher`.

pub mod anomaly_store;
pub mod lockfile;
pub mod persistence;

pub use anomaly_store::AnomalyStore;
pub use lockfile::ProcessLock;
pub use persistence::{open_sink, AnomalySink, JsonFileSink, PersistenceError, SledSink};
