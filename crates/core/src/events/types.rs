use serde::{Deserialize, Serialize};

/// Outcome of a single video within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Saved,
    Skipped,
    Error,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Saved => "saved",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }
}

/// One event of a batch stream, as emitted by the worker and relayed to the client.
///
/// The wire form is tagged by `event`. Optional fields that are absent or
/// `null` decode to `None` and are omitted when encoding. Unknown fields are
/// ignored; an unknown `event` tag does not decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Emitted once before the first item.
    Start {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bundle: Option<String>,
    },
    /// Outcome of one video identifier.
    Progress {
        video_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        status: ProgressStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// 1-based position within the batch.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
        /// Where the worker wrote the document.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    /// Emitted once after the last item.
    Complete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bundle: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bundle_dir: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_saved: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_skipped: Option<u64>,
    },
    /// Batch-level failure.
    Error { message: String },
}

impl ProgressEvent {
    /// Builds a batch-level error event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Builds a progress event with only the required fields set.
    pub fn progress(video_id: impl Into<String>, status: ProgressStatus) -> Self {
        Self::Progress {
            video_id: video_id.into(),
            title: None,
            status,
            error: None,
            index: None,
            total: None,
            path: None,
        }
    }

    /// The wire tag of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Progress { .. } => "progress",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }
}
