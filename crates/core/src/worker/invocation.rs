use std::path::PathBuf;

use crate::bundle::BundleName;
use crate::config::WorkerConfig;

/// A fully built worker command line: a fixed program plus discrete arguments.
///
/// Arguments are handed to the spawn primitive one by one and never joined
/// into a shell string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerInvocation {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Builds the streaming batch invocation:
    ///
    /// `<program> <fixed args..> batch --output <root> --bundle <name> [--lang <tags..>] --jsonl -- <ids..>`
    ///
    /// The `--` marker keeps identifiers that begin with `-` from being read
    /// as options.
    pub fn batch(
        worker: &WorkerConfig,
        bundle: &BundleName,
        languages: &[String],
        video_ids: &[String],
    ) -> Self {
        let mut args = worker.args.clone();
        args.extend([
            "batch".to_string(),
            "--output".to_string(),
            worker.output_root.to_string_lossy().to_string(),
            "--bundle".to_string(),
            bundle.as_str().to_string(),
        ]);

        if !languages.is_empty() {
            args.push("--lang".to_string());
            args.extend(languages.iter().cloned());
        }

        args.push("--jsonl".to_string());
        args.push("--".to_string());
        args.extend(video_ids.iter().cloned());

        Self::new(worker.program.clone(), args)
    }
}
