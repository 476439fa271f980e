pub mod batch;
pub mod bundle;
pub mod config;
pub mod events;
pub mod testing;
pub mod worker;

pub use batch::{
    BatchError, BatchOrchestrator, BatchOutcome, BatchReport, BatchStatus, ChannelSink,
    SinkError, StreamSink, ValidatedBatch, ValidationError,
};
pub use bundle::{BundleIndexer, BundleName};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use events::{ProgressEvent, ProgressStatus};
pub use worker::{ProcessRunner, RunnerError, TokioProcessRunner, WorkerInvocation};
