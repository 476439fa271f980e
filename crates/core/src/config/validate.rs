use super::{types::Config, ConfigError};
use crate::batch::is_valid_language_tag;

/// Longest batch ceiling accepted, one day.
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Worker program and output root are set
/// - Batch limits are non-zero and the timeout is at most a day
/// - Default languages are well-formed tags
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.worker.program.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "worker.program cannot be empty".to_string(),
        ));
    }

    if config.worker.output_root.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "worker.output_root cannot be empty".to_string(),
        ));
    }

    if config.worker.stderr_limit_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "worker.stderr_limit_bytes cannot be 0".to_string(),
        ));
    }

    if config.worker.line_limit_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "worker.line_limit_bytes cannot be 0".to_string(),
        ));
    }

    if config.batch.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "batch.timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.batch.timeout_secs > MAX_TIMEOUT_SECS {
        return Err(ConfigError::ValidationError(format!(
            "batch.timeout_secs cannot exceed {} (got {})",
            MAX_TIMEOUT_SECS, config.batch.timeout_secs
        )));
    }

    if config.batch.max_videos == 0 {
        return Err(ConfigError::ValidationError(
            "batch.max_videos cannot be 0".to_string(),
        ));
    }

    if config.batch.channel_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "batch.channel_capacity cannot be 0".to_string(),
        ));
    }

    if let Some(tag) = config
        .batch
        .default_languages
        .iter()
        .find(|tag| !is_valid_language_tag(tag))
    {
        return Err(ConfigError::ValidationError(format!(
            "batch.default_languages contains an invalid tag: {:?}",
            tag
        )));
    }

    Ok(())
}
