//! Error types for the bundle module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced when turning user input into a bundle name.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BundleNameError {
    /// Input was empty or whitespace only.
    #[error("missing bundle name")]
    Empty,
}

/// Errors that can occur while regenerating a bundle index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The bundle path does not exist or is not a directory.
    #[error("Bundle directory not found: {path}")]
    NotADirectory { path: PathBuf },

    /// Reading a document or writing the index failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IndexError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
