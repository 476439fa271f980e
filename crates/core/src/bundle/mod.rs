//! Bundles: named directories of transcript documents plus a regenerated index.
//!
//! A bundle directory is append-only from the server's point of view. The
//! index (`_index.md`) is always a full recomputation from the documents
//! currently on disk, never an accumulation.

mod error;
mod index;
mod name;

pub use error::{BundleNameError, IndexError};
pub use index::{
    parse_front_matter, read_bundle_entries, render_index, BundleIndexEntry, BundleIndexer,
    IndexDocument, IndexMetadata, DEFAULT_QUERY, INDEX_FILE_NAME,
};
pub use name::{sanitize_bundle_name, BundleName};
