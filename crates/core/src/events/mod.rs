//! Worker progress events and their line-oriented decoding.
//!
//! The worker writes one JSON object per line to stdout. Each line decodes to
//! exactly one [`ProgressEvent`] or is rejected as a [`DecodeError`]; blank
//! lines produce nothing.

mod translate;
mod types;

pub use translate::{translate, DecodeError};
pub use types::{ProgressEvent, ProgressStatus};
