//! Batch requests: validation, orchestration, and event delivery.
//!
//! A batch is one worker process run for a list of video identifiers. The
//! [`BatchOrchestrator`] validates the request body, spawns the worker, and
//! relays every decoded [`ProgressEvent`](crate::events::ProgressEvent) to a
//! [`StreamSink`] as soon as the worker prints it.

mod orchestrator;
mod outcome;
mod request;
mod sink;

pub use orchestrator::{BatchError, BatchOrchestrator, RunningBatch};
pub use outcome::{BatchOutcome, BatchReport, BatchStatus, BatchTally, VideoOutcome};
pub use request::{is_valid_language_tag, ValidatedBatch, ValidationError, MAX_IDENTIFIER_LEN};
pub use sink::{encode_sse_frame, ChannelSink, SinkError, StreamSink};
