//! Parsing and validating batch request bodies.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::bundle::BundleName;
use crate::config::BatchConfig;

/// Longest identifier accepted. Real ones are 11 characters or a URL.
pub const MAX_IDENTIFIER_LEN: usize = 2048;

static LANGUAGE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]{2,3}(-[A-Za-z0-9]{1,8})*$").expect("valid regex"));

/// Whether `tag` looks like a transcript language tag (`en`, `pt-BR`, `zh-Hans`).
pub fn is_valid_language_tag(tag: &str) -> bool {
    LANGUAGE_TAG.is_match(tag)
}

/// Client input problems, detected before any process is spawned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Body is not a JSON object.
    #[error("invalid request")]
    InvalidRequest,

    /// `video_ids` is absent, empty, or not a list.
    #[error("missing identifiers")]
    MissingIdentifiers,

    /// `bundle` is absent, not a string, or blank.
    #[error("missing bundle name")]
    MissingBundleName,

    #[error("too many identifiers (max {max})")]
    TooManyIdentifiers { max: usize },

    /// Identifier at the given 0-based position is not a usable string.
    #[error("invalid video identifier at position {index}")]
    InvalidIdentifier { index: usize },

    #[error("invalid language tag: {tag}")]
    InvalidLanguage { tag: String },
}

/// A batch request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedBatch {
    /// Non-empty, in request order.
    pub video_ids: Vec<String>,
    pub bundle: BundleName,
    pub languages: Vec<String>,
}

impl ValidatedBatch {
    /// Validates a raw request body against the configured limits.
    ///
    /// Checks run in a fixed order: body shape, identifiers present, bundle
    /// name present, then the per-field limits.
    pub fn parse(body: &[u8], limits: &BatchConfig) -> Result<Self, ValidationError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|_| ValidationError::InvalidRequest)?;
        let Value::Object(mut fields) = value else {
            return Err(ValidationError::InvalidRequest);
        };

        let raw_ids = match fields.remove("video_ids") {
            Some(Value::Array(items)) if !items.is_empty() => items,
            _ => return Err(ValidationError::MissingIdentifiers),
        };

        let bundle = match fields.remove("bundle") {
            Some(Value::String(raw)) => {
                BundleName::parse(&raw).map_err(|_| ValidationError::MissingBundleName)?
            }
            _ => return Err(ValidationError::MissingBundleName),
        };

        if raw_ids.len() > limits.max_videos {
            return Err(ValidationError::TooManyIdentifiers {
                max: limits.max_videos,
            });
        }

        let video_ids = raw_ids
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::String(s) if is_usable_identifier(s.trim()) => Ok(s.trim().to_string()),
                _ => Err(ValidationError::InvalidIdentifier { index }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let languages = match fields.remove("languages") {
            None | Some(Value::Null) => limits.default_languages.clone(),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(tag) if is_valid_language_tag(&tag) => Ok(tag),
                    other => Err(ValidationError::InvalidLanguage {
                        tag: match other {
                            Value::String(tag) => tag,
                            v => v.to_string(),
                        },
                    }),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(ValidationError::InvalidLanguage {
                    tag: other.to_string(),
                })
            }
        };

        Ok(Self {
            video_ids,
            bundle,
            languages,
        })
    }
}

fn is_usable_identifier(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_IDENTIFIER_LEN
        && !id.chars().any(|c| c.is_whitespace() || c.is_control())
}
