//! Bundle index regeneration.

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::error::IndexError;

/// File name of the generated index inside a bundle directory.
pub const INDEX_FILE_NAME: &str = "_index.md";

/// Query recorded for bundles created by batch downloads.
pub const DEFAULT_QUERY: &str = "batch import";

/// One document listed in a bundle index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleIndexEntry {
    pub filename: String,
    pub title: String,
    pub video_id: String,
}

/// Front-matter of the index itself. Preserved across regenerations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexMetadata {
    pub bundle: String,
    pub query: String,
    pub created_at: String,
    pub source_url: Option<String>,
}

/// Result of a regeneration.
#[derive(Debug, Clone, Serialize)]
pub struct IndexDocument {
    pub path: PathBuf,
    pub metadata: IndexMetadata,
    pub entries: Vec<BundleIndexEntry>,
    /// Rendered markdown, exactly as written to disk.
    #[serde(skip)]
    pub contents: String,
    /// False when the index on disk already matched and nothing was written.
    pub written: bool,
}

/// Parses the flat `key: value` block between the first two `---` markers.
///
/// Surrounding quotes are stripped from values. Text without a complete
/// front-matter block yields an empty map.
pub fn parse_front_matter(text: &str) -> BTreeMap<String, String> {
    let mut parts = text.splitn(3, "---");
    let (Some(_), Some(block), Some(_)) = (parts.next(), parts.next(), parts.next()) else {
        return BTreeMap::new();
    };

    block
        .trim()
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(": ")?;
            let value = value.trim().trim_matches('"').trim_matches('\'');
            Some((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

/// Reads every transcript document in `bundle_dir` (all `*.md` except the
/// index), sorted by file name.
pub fn read_bundle_entries(bundle_dir: &Path) -> Result<Vec<BundleIndexEntry>, IndexError> {
    let read_dir = fs::read_dir(bundle_dir).map_err(|e| IndexError::io(bundle_dir, e))?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| IndexError::io(bundle_dir, e))?;
        let path = entry.path();
        let is_markdown = path.extension().is_some_and(|ext| ext == "md");
        let is_index = path.file_name().is_some_and(|n| n == INDEX_FILE_NAME);
        if is_markdown && !is_index && path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    let mut entries = Vec::with_capacity(files.len());
    for path in files {
        let text = fs::read_to_string(&path).map_err(|e| IndexError::io(&path, e))?;
        let mut fm = parse_front_matter(&text);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        entries.push(BundleIndexEntry {
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            title: fm.remove("title").unwrap_or(stem),
            video_id: fm.remove("video_id").unwrap_or_default(),
        });
    }

    Ok(entries)
}

/// Renders the index markdown for the given metadata and entries.
///
/// Pure: the same inputs always render the same bytes.
pub fn render_index(meta: &IndexMetadata, entries: &[BundleIndexEntry]) -> String {
    let count = entries.len();
    let mut lines = vec![
        "---".to_string(),
        format!("bundle: \"{}\"", meta.bundle),
        format!("query: \"{}\"", meta.query),
        format!("count: {}", count),
        format!("created_at: \"{}\"", meta.created_at),
    ];
    if let Some(url) = &meta.source_url {
        lines.push(format!("source_url: \"{}\"", url));
    }
    lines.extend([
        "---".to_string(),
        String::new(),
        format!("# {}", meta.bundle),
        String::new(),
    ]);

    match &meta.source_url {
        Some(url) => lines.push(format!("> Source: [{}]({})", meta.query, url)),
        None => lines.push(format!("> Search query: \"{}\"", meta.query)),
    }
    lines.push(format!("> {} transcripts", count));
    lines.extend([
        String::new(),
        "## Contents".to_string(),
        String::new(),
        "| # | Title | Video |".to_string(),
        "|---|-------|-------|".to_string(),
    ]);

    for (i, entry) in entries.iter().enumerate() {
        lines.push(format!(
            "| {} | [{}](./{}) | [YouTube](https://youtube.com/watch?v={}) |",
            i + 1,
            entry.title.replace('|', "\\|"),
            entry.filename,
            entry.video_id
        ));
    }
    lines.push(String::new());

    lines.join("\n")
}

/// Regenerates `_index.md` from the documents present in a bundle directory.
#[derive(Debug, Clone)]
pub struct BundleIndexer {
    default_query: String,
}

impl Default for BundleIndexer {
    fn default() -> Self {
        Self::new()
    }
}

impl BundleIndexer {
    pub fn new() -> Self {
        Self {
            default_query: DEFAULT_QUERY.to_string(),
        }
    }

    /// Sets the query recorded when a bundle has no index yet.
    pub fn with_default_query(mut self, query: impl Into<String>) -> Self {
        self.default_query = query.into();
        self
    }

    /// Recomputes the index from the directory's current contents and
    /// overwrites it.
    ///
    /// Idempotent: with no document changes in between, a second call renders
    /// byte-identical output (metadata, including `created_at`, is read back
    /// from the existing index) and skips the write.
    pub fn regenerate(&self, bundle_dir: &Path) -> Result<IndexDocument, IndexError> {
        if !bundle_dir.is_dir() {
            return Err(IndexError::NotADirectory {
                path: bundle_dir.to_path_buf(),
            });
        }

        let index_path = bundle_dir.join(INDEX_FILE_NAME);
        let existing = match fs::read_to_string(&index_path) {
            Ok(text) => Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(IndexError::io(&index_path, e)),
        };

        let metadata = self.metadata_for(bundle_dir, existing.as_deref());
        let entries = read_bundle_entries(bundle_dir)?;
        let contents = render_index(&metadata, &entries);

        let written = existing.as_deref() != Some(contents.as_str());
        if written {
            write_atomically(&index_path, &contents)?;
            debug!(
                "Regenerated index for {:?} ({} entries)",
                bundle_dir,
                entries.len()
            );
        }

        Ok(IndexDocument {
            path: index_path,
            metadata,
            entries,
            contents,
            written,
        })
    }

    fn metadata_for(&self, bundle_dir: &Path, existing: Option<&str>) -> IndexMetadata {
        let mut fm = existing.map(parse_front_matter).unwrap_or_default();
        let mut take = |key: &str| fm.remove(key).filter(|v| !v.is_empty());

        let dir_name = bundle_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        IndexMetadata {
            bundle: take("bundle").unwrap_or(dir_name),
            query: take("query").unwrap_or_else(|| self.default_query.clone()),
            created_at: take("created_at")
                .unwrap_or_else(|| Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()),
            source_url: take("source_url"),
        }
    }
}

fn write_atomically(path: &Path, contents: &str) -> Result<(), IndexError> {
    let tmp = path.with_file_name(format!(".{}.{}.tmp", INDEX_FILE_NAME, uuid::Uuid::new_v4()));
    fs::write(&tmp, contents).map_err(|e| IndexError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        IndexError::io(path, e)
    })
}
