//! Ingest loop shared by every streaming input mode.
//!
//! Pulls events from a [`ReadingSource`] and feeds them to the engine until
//! the source is exhausted or the process is cancelled.

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::source::{ReadingSource, SourceEvent};
use crate::engine::AnomalyEngine;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestLoopStats {
    /// Frames and single readings pulled from the source
    pub messages: u64,
    /// Readings the engine accepted
    pub readings_accepted: u64,
    /// Messages rejected by validation
    pub messages_rejected: u64,
    pub anomalies: u64,
}

pub struct IngestLoop {
    engine: Arc<AnomalyEngine>,
    cancel_token: CancellationToken,
}

impl IngestLoop {
    pub fn new(engine: Arc<AnomalyEngine>, cancel_token: CancellationToken) -> Self {
        Self {
            engine,
            cancel_token,
        }
    }

    /// Run until EOF, a source error, or cancellation.
    pub async fn run<S: ReadingSource>(self, source: &mut S) -> IngestLoopStats {
        let mut stats = IngestLoopStats::default();
        info!(source = source.source_name(), "Ingesting readings");

        loop {
            let event = tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!(source = source.source_name(), "Ingest loop cancelled");
                    break;
                }
                result = source.next_event() => match result {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(source = source.source_name(), error = %e, "Source error");
                        break;
                    }
                }
            };

            let outcomes = match event {
                SourceEvent::Eof => {
                    info!(source = source.source_name(), "Source exhausted");
                    break;
                }
                SourceEvent::Frame(frame) => self.engine.ingest_frame(frame),
                SourceEvent::Reading(raw) => self.engine.ingest_raw(raw).map(|o| vec![o]),
            };
            stats.messages += 1;

            match outcomes {
                Ok(outcomes) => {
                    stats.readings_accepted += outcomes.len() as u64;
                    stats.anomalies += outcomes.iter().map(|o| o.anomalies.len() as u64).sum::<u64>();
                }
                Err(e) => {
                    stats.messages_rejected += 1;
                    debug!(source = source.source_name(), error = %e, "Message rejected");
                }
            }
        }

        info!(
            messages = stats.messages,
            accepted = stats.readings_accepted,
            rejected = stats.messages_rejected,
            anomalies = stats.anomalies,
            "Ingest loop finished"
        );
        stats
    }
}
