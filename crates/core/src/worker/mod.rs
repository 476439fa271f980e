//! Launching the external transcript worker.
//!
//! This module provides the [`ProcessRunner`] trait and a tokio-based
//! implementation that spawns the worker as a child process, exposes its
//! stdout as an incremental line stream, and captures stderr up to a cap.
//!
//! # Example
//!
//! ```ignore
//! use scribe_core::worker::{ProcessRunner, TokioProcessRunner, WorkerInvocation};
//!
//! let runner = TokioProcessRunner::new(64 * 1024, 1024 * 1024);
//! let invocation = WorkerInvocation::batch(&config.worker, &bundle, &languages, &video_ids);
//! let mut handle = runner.spawn(&invocation).await?;
//!
//! while let Some(line) = handle.next_line().await? {
//!     println!("{}", line);
//! }
//! let exit = handle.wait().await?;
//! ```

mod error;
mod invocation;
mod process;
mod traits;

pub use error::RunnerError;
pub use invocation::WorkerInvocation;
pub use process::TokioProcessRunner;
pub use traits::{ProcessRunner, WorkerExit, WorkerHandle};
