//! Reading source abstraction for telemetry ingestion.
//!
//! Provides a unified trait for pulling readings from different producers:
//! JSON lines (stdin or any async reader) and in-memory replay.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tracing::warn;

use crate::types::{RawReading, SensorFrame};

/// One message on the wire: a full three-parameter frame or a single
/// reading. Frames are tried first since every field of a reading is
/// optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireMessage {
    Frame(SensorFrame),
    Reading(RawReading),
}

/// Events produced by a reading source.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    Frame(SensorFrame),
    Reading(RawReading),
    /// No more data (EOF for readers, end of the replay list)
    Eof,
}

impl From<WireMessage> for SourceEvent {
    fn from(message: WireMessage) -> Self {
        match message {
            WireMessage::Frame(frame) => SourceEvent::Frame(frame),
            WireMessage::Reading(reading) => SourceEvent::Reading(reading),
        }
    }
}

/// Trait abstracting where readings come from.
///
/// The ingest loop calls [`next_event`](ReadingSource::next_event) inside a
/// `select!` with cancellation.
#[async_trait]
pub trait ReadingSource: Send + 'static {
    /// Returns `SourceEvent::Eof` when no more data is available and `Err`
    /// only on unrecoverable read errors.
    async fn next_event(&mut self) -> io::Result<SourceEvent>;

    /// Human-readable name for logging
    fn source_name(&self) -> &str;
}

// ============================================================================
// JSON lines
// ============================================================================

/// Reads one JSON `WireMessage` per line. Blank and malformed lines are
/// skipped (malformed ones with a warning).
pub struct JsonLinesSource<R> {
    reader: R,
    name: &'static str,
    line_buffer: String,
    skipped: u64,
}

/// JSON lines from the process's stdin:
/// `python sensor_sim.py | aquasense --stdin`
pub type StdinSource = JsonLinesSource<BufReader<Stdin>>;

impl StdinSource {
    pub fn stdin() -> Self {
        JsonLinesSource::new(BufReader::new(tokio::io::stdin()), "stdin")
    }
}

impl<R: AsyncBufRead + Unpin + Send + 'static> JsonLinesSource<R> {
    pub fn new(reader: R, name: &'static str) -> Self {
        Self {
            reader,
            name,
            line_buffer: String::with_capacity(512),
            skipped: 0,
        }
    }

    /// Lines dropped because they were not valid JSON messages
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send + 'static> ReadingSource for JsonLinesSource<R> {
    async fn next_event(&mut self) -> io::Result<SourceEvent> {
        loop {
            self.line_buffer.clear();
            if self.reader.read_line(&mut self.line_buffer).await? == 0 {
                return Ok(SourceEvent::Eof);
            }
            let line = self.line_buffer.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<WireMessage>(line) {
                Ok(message) => return Ok(message.into()),
                Err(e) => {
                    self.skipped += 1;
                    warn!(source = self.name, error = %e, "Skipping malformed line");
                }
            }
        }
    }

    fn source_name(&self) -> &str {
        self.name
    }
}

// ============================================================================
// Replay
// ============================================================================

/// Replays pre-loaded messages with an optional inter-message delay.
pub struct ReplaySource {
    messages: std::vec::IntoIter<WireMessage>,
    delay: Duration,
    yielded_first: bool,
}

impl ReplaySource {
    pub fn new(messages: Vec<WireMessage>, delay: Duration) -> Self {
        Self {
            messages: messages.into_iter(),
            delay,
            yielded_first: false,
        }
    }
}

#[async_trait]
impl ReadingSource for ReplaySource {
    async fn next_event(&mut self) -> io::Result<SourceEvent> {
        if self.yielded_first && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.messages.next() {
            Some(message) => {
                self.yielded_first = true;
                Ok(message.into())
            }
            None => Ok(SourceEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}
