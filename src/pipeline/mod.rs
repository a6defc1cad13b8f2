//! Streaming ingestion
//!
//! ```text
//! ReadingSource (stdin JSON lines / replay)
//!     → IngestLoop
//!         → AnomalyEngine::ingest_frame / ingest_raw
//! ```

pub mod processing_loop;
pub mod source;

pub use processing_loop::{IngestLoop, IngestLoopStats};
pub use source::{JsonLinesSource, ReadingSource, ReplaySource, SourceEvent, StdinSource, WireMessage};
