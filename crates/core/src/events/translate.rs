use thiserror::Error;

use super::types::ProgressEvent;

/// Longest slice of an offending line kept in a [`DecodeError`].
const SNIPPET_LEN: usize = 120;

/// A worker output line that is not a well-formed event.
#[derive(Debug, Error)]
#[error("Undecodable progress line ({reason}): {snippet}")]
pub struct DecodeError {
    pub reason: String,
    pub snippet: String,
}

/// Decodes one line of worker output.
///
/// Returns `Ok(None)` for blank lines. Each line is decoded on its own; no
/// state carries over between calls.
pub fn translate(line: &str) -> Result<Option<ProgressEvent>, DecodeError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    serde_json::from_str::<ProgressEvent>(line)
        .map(Some)
        .map_err(|e| DecodeError {
            reason: e.to_string(),
            snippet: line.chars().take(SNIPPET_LEN).collect(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ProgressStatus;

    #[test]
    fn test_blank_lines_are_ignored() {
        assert!(translate("").unwrap().is_none());
        assert!(translate("   \r").unwrap().is_none());
    }

    #[test]
    fn test_translate_progress_line() {
        let line = r#"{"event": "progress", "index": 1, "total": 2, "video_id": "dQw4w9WgXcQ", "title": "Never Gonna", "status": "saved", "path": "transcripts/x/never.md"}"#;
        let event = translate(line).unwrap().unwrap();
        assert_eq!(
            event,
            ProgressEvent::Progress {
                video_id: "dQw4w9WgXcQ".to_string(),
                title: Some("Never Gonna".to_string()),
                status: ProgressStatus::Saved,
                error: None,
                index: Some(1),
                total: Some(2),
                path: Some("transcripts/x/never.md".to_string()),
            }
        );
    }

    #[test]
    fn test_translate_start_and_complete() {
        assert!(matches!(
            translate(r#"{"event": "start", "total": 3, "bundle": "b"}"#).unwrap(),
            Some(ProgressEvent::Start { total: Some(3), .. })
        ));
        assert!(matches!(
            translate(r#"{"event": "complete", "bundle": "b", "total_saved": 2, "total_skipped": 1}"#).unwrap(),
            Some(ProgressEvent::Complete { total_saved: Some(2), .. })
        ));
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let event = translate(r#"{"event": "error", "message": "boom", "code": 7}"#)
            .unwrap()
            .unwrap();
        assert_eq!(event, ProgressEvent::error("boom"));
    }

    #[test]
    fn test_malformed_lines_fail() {
        for line in [
            "not json",
            "{\"event\": \"progress\"",
            r#"{"event": "progress", "video_id": "x"}"#,
            r#"{"event": "progress", "video_id": "x", "status": "exploded"}"#,
            r#"{"event": "heartbeat"}"#,
            r#"{"video_id": "x", "status": "saved"}"#,
            "[1, 2, 3]",
            "Fetching 1/3: dQw4w9WgXcQ...",
        ] {
            assert!(translate(line).is_err(), "line should not decode: {}", line);
        }
    }

    #[test]
    fn test_decode_error_snippet_is_bounded() {
        let line = "x".repeat(1000);
        let err = translate(&line).unwrap_err();
        assert_eq!(err.snippet.len(), SNIPPET_LEN);
    }
}
