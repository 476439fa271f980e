//! Testing utilities and mock implementations.
//!
//! [`MockProcessRunner`] stands in for the worker executable and
//! [`RecordingSink`] for the streaming client, so batches can be driven end
//! to end without spawning processes or opening sockets.
//!
//! # Example
//!
//! ```rust,ignore
//! use scribe_core::testing::{MockProcessRunner, RecordingSink, ScriptedWorker};
//!
//! let runner = Arc::new(MockProcessRunner::with_script(
//!     ScriptedWorker::new().event(&ProgressEvent::progress("abc", ProgressStatus::Saved)),
//! ));
//! let orchestrator = BatchOrchestrator::new(&config, runner.clone());
//!
//! let mut sink = RecordingSink::new();
//! let report = orchestrator.run(body, &mut sink).await?;
//! ```

mod mock_runner;
mod recording_sink;

pub use mock_runner::{MockProcessRunner, ScriptedWorker};
pub use recording_sink::RecordingSink;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::config::Config;
    use std::path::Path;

    /// A config whose worker writes under `output_root`.
    pub fn config_with_output_root(output_root: &Path) -> Config {
        let mut config = Config::default();
        config.worker.output_root = output_root.to_path_buf();
        config
    }

    /// A request body for `video_ids` into `bundle`.
    pub fn batch_body(video_ids: &[&str], bundle: &str) -> Vec<u8> {
        serde_json::json!({ "video_ids": video_ids, "bundle": bundle })
            .to_string()
            .into_bytes()
    }

    /// A saved transcript document as the worker writes it.
    pub fn transcript_document(title: &str, video_id: &str) -> String {
        format!(
            "---\ntitle: \"{}\"\nvideo_id: \"{}\"\n---\n\n# {}\n\nTranscript text.\n",
            title, video_id, title
        )
    }
}
