//! Error types for the worker module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while launching or talking to the worker.
///
/// Spawn failures (`NotFound`, `PermissionDenied`, `Spawn`) are distinct from a
/// worker that ran and exited non-zero, which is reported through
/// [`WorkerExit`](super::WorkerExit) instead.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Worker executable not found.
    #[error("Worker executable not found: {path}")]
    NotFound { path: PathBuf },

    /// Worker executable exists but cannot be executed.
    #[error("Permission denied executing worker: {path}")]
    PermissionDenied { path: PathBuf },

    /// Any other spawn failure.
    #[error("Failed to spawn worker {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stdout line ran past the configured limit and was discarded.
    /// Reading can continue with the next line.
    #[error("Worker output line exceeded {limit} bytes")]
    LineTooLong { limit: usize },

    /// I/O error while reading output or waiting for exit.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// Classifies an error returned by the spawn primitive.
    pub fn from_spawn(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Spawn { path, source },
        }
    }

    /// Whether the error happened before any process existed.
    pub fn is_spawn_failure(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::PermissionDenied { .. } | Self::Spawn { .. }
        )
    }
}
