use serde::Serialize;
use std::fmt;

use super::error::BundleNameError;

/// Folds ASCII uppercase to lowercase and replaces every character outside
/// `[a-z0-9_-]` with `_`.
///
/// Total and idempotent: `sanitize_bundle_name(sanitize_bundle_name(s)) == sanitize_bundle_name(s)`.
/// The output has exactly one character per input character, so it never
/// contains `/` or `.` and cannot escape the output root.
pub fn sanitize_bundle_name(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// A validated, sanitized bundle name. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BundleName(String);

impl BundleName {
    /// Trims the raw input, rejects it if empty, then sanitizes it.
    pub fn parse(raw: &str) -> Result<Self, BundleNameError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(BundleNameError::Empty);
        }
        Ok(Self(sanitize_bundle_name(trimmed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for BundleName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BundleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
