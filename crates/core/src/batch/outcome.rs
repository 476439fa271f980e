//! Folding a batch's event sequence into a result.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

use crate::bundle::BundleName;
use crate::events::{ProgressEvent, ProgressStatus};

/// Per-video result, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoOutcome {
    pub video_id: String,
    pub status: ProgressStatus,
}

/// The fold of every event a batch forwarded to the client.
///
/// Clients reconstruct the same thing from the stream; it is never sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchTally {
    pub outcomes: Vec<VideoOutcome>,
    pub saved: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Set by any batch-level `error` event.
    pub had_fatal_error: bool,
}

impl BatchTally {
    pub fn record(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Progress {
                video_id, status, ..
            } => {
                match status {
                    ProgressStatus::Saved => self.saved += 1,
                    ProgressStatus::Skipped => self.skipped += 1,
                    ProgressStatus::Error => self.failed += 1,
                }
                self.outcomes.push(VideoOutcome {
                    video_id: video_id.clone(),
                    status: *status,
                });
            }
            ProgressEvent::Error { .. } => self.had_fatal_error = true,
            ProgressEvent::Start { .. } | ProgressEvent::Complete { .. } => {}
        }
    }

    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a ProgressEvent>) -> Self {
        let mut tally = Self::default();
        for event in events {
            tally.record(event);
        }
        tally
    }
}

/// How the worker run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Worker exited zero after its output was drained.
    Completed,
    /// Worker exited non-zero, was killed by a signal, or could not be waited on.
    WorkerFailed { code: Option<i32> },
    /// The wall-clock ceiling expired and the worker was killed.
    TimedOut,
    /// The client went away and the worker was killed.
    ClientGone,
}

impl BatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::WorkerFailed { .. } => "worker_failed",
            Self::TimedOut => "timed_out",
            Self::ClientGone => "client_gone",
        }
    }
}

/// Overall verdict for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Success,
    PartialFailure,
    Fatal,
}

/// Everything known about a finished batch. Used for logs and metrics.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub bundle: BundleName,
    pub requested: usize,
    pub tally: BatchTally,
    /// Events successfully handed to the sink, by wire tag.
    pub forwarded: BTreeMap<&'static str, u64>,
    pub decode_failures: u64,
    pub outcome: BatchOutcome,
    /// Number of documents in the index after the final reconcile, if one ran.
    pub indexed_documents: Option<usize>,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn status(&self) -> BatchStatus {
        if self.outcome != BatchOutcome::Completed || self.tally.had_fatal_error {
            BatchStatus::Fatal
        } else if self.tally.skipped + self.tally.failed > 0
            || self.tally.outcomes.len() < self.requested
        {
            BatchStatus::PartialFailure
        } else {
            BatchStatus::Success
        }
    }

    pub fn forwarded_total(&self) -> u64 {
        self.forwarded.values().sum()
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
