use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// External transcript worker configuration.
///
/// None of these values are ever derived from request data.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Executable to launch.
    #[serde(default = "default_program")]
    pub program: PathBuf,
    /// Fixed arguments placed before the batch subcommand (e.g. `["-m", "yt_scribe"]`).
    #[serde(default)]
    pub args: Vec<String>,
    /// Root directory under which bundle directories live.
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    /// Maximum number of stderr bytes retained per run.
    #[serde(default = "default_stderr_limit")]
    pub stderr_limit_bytes: usize,
    /// Longest stdout line accepted. Longer lines are dropped.
    #[serde(default = "default_line_limit")]
    pub line_limit_bytes: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            output_root: default_output_root(),
            stderr_limit_bytes: default_stderr_limit(),
            line_limit_bytes: default_line_limit(),
        }
    }
}

fn default_program() -> PathBuf {
    PathBuf::from("yt-scribe")
}

fn default_output_root() -> PathBuf {
    PathBuf::from("transcripts")
}

fn default_stderr_limit() -> usize {
    64 * 1024
}

fn default_line_limit() -> usize {
    1024 * 1024
}

/// Batch orchestration limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    /// Wall-clock ceiling for a whole batch, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum number of identifiers accepted in one request.
    #[serde(default = "default_max_videos")]
    pub max_videos: usize,
    /// Languages passed to the worker when the request names none.
    #[serde(default)]
    pub default_languages: Vec<String>,
    /// Regenerate the bundle index after the worker exits.
    #[serde(default = "default_true")]
    pub reindex_on_exit: bool,
    /// Events buffered between the orchestrator and the response body.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl BatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_videos: default_max_videos(),
            default_languages: Vec::new(),
            reindex_on_exit: true,
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_timeout() -> u64 {
    900 // 15 minutes
}

fn default_max_videos() -> usize {
    200
}

fn default_true() -> bool {
    true
}

fn default_channel_capacity() -> usize {
    16
}

/// Sanitized config for API responses (filesystem layout hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub worker: SanitizedWorkerConfig,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedWorkerConfig {
    /// Executable file name only, never the full path.
    pub program: String,
    pub output_root_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            worker: SanitizedWorkerConfig {
                program: config
                    .worker
                    .program
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                output_root_configured: !config.worker.output_root.as_os_str().is_empty(),
            },
            batch: config.batch.clone(),
        }
    }
}
