//! Progress channel - replays a scan's progress log, then follows it until the scan ends

use crate::registry::{ProgressLog, ScanStore};
use crate::repository::StoredScan;
use crate::types::ScanProgress;
use async_stream::stream;
use futures::Stream;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    Progress {
        /// Position in the scan's progress log.
        index: usize,
        #[serde(flatten)]
        progress: ScanProgress,
    },
    Complete {
        result: Arc<StoredScan>,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    pub fn index(&self) -> Option<usize> {
        match self {
            ProgressEvent::Progress { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Subscribe to one scan. `None` if the id is not registered.
///
/// Delivers log entries from `resume_from` onward, then exactly one
/// terminal event, and removes the scan from `store` when done. Each
/// subscription keeps its own cursor, so a client that reconnects with its
/// last seen index gets no duplicates.
pub fn subscribe(
    store: Arc<dyn ScanStore>,
    scan_id: &str,
    poll: Duration,
    resume_from: usize,
) -> Option<impl Stream<Item = ProgressEvent> + Send + 'static> {
    let active = store.get(scan_id)?;
    let scan_id = scan_id.to_string();

    Some(stream! {
        let mut cursor = resume_from;
        let mut completion = active.completion.clone();
        let mut ticker = tokio::time::interval(poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            for event in drain(&active.progress, &mut cursor) {
                yield event;
            }
            tokio::select! {
                outcome = &mut completion => break outcome,
                _ = ticker.tick() => {}
            }
        };

        // Entries appended between the last tick and completion.
        for event in drain(&active.progress, &mut cursor) {
            yield event;
        }

        match outcome {
            Ok(result) => yield ProgressEvent::Complete { result },
            Err(error) => {
                tracing::info!(scan_id = %scan_id, error = %error, "Scan ended without result");
                yield ProgressEvent::Error { message: error.to_string() };
            }
        }

        store.delete(&scan_id);
        tracing::debug!(scan_id = %scan_id, "Scan removed from registry");
    })
}

fn drain(log: &ProgressLog, cursor: &mut usize) -> Vec<ProgressEvent> {
    let start = *cursor;
    let entries = log.since(start);
    *cursor += entries.len();
    entries
        .into_iter()
        .enumerate()
        .map(|(offset, progress)| ProgressEvent::Progress {
            index: start + offset,
            progress,
        })
        .collect()
}
