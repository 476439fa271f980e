//! Tokio child-process implementation of [`ProcessRunner`].

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::error::RunnerError;
use super::invocation::WorkerInvocation;
use super::traits::{ProcessRunner, WorkerExit, WorkerHandle};
use crate::config::WorkerConfig;

/// How long stderr may stay open after the worker itself has exited.
///
/// A grandchild that inherited the pipe can keep it open indefinitely.
const STDERR_GRACE: Duration = Duration::from_secs(2);

/// Spawns the worker with `tokio::process`.
#[derive(Debug, Clone)]
pub struct TokioProcessRunner {
    stderr_limit: usize,
    line_limit: usize,
}

impl TokioProcessRunner {
    /// Creates a runner that keeps at most `stderr_limit` bytes of stderr and
    /// rejects stdout lines longer than `line_limit` bytes.
    pub fn new(stderr_limit: usize, line_limit: usize) -> Self {
        Self {
            stderr_limit,
            line_limit,
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.stderr_limit_bytes, config.line_limit_bytes)
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    fn name(&self) -> &str {
        "tokio-process"
    }

    async fn spawn(
        &self,
        invocation: &WorkerInvocation,
    ) -> Result<Box<dyn WorkerHandle>, RunnerError> {
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunnerError::from_spawn(&invocation.program, e))?;

        debug!(
            "Spawned worker {:?} (pid {:?}) with {} args",
            invocation.program,
            child.id(),
            invocation.args.len()
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("worker stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("worker stderr was not captured"))?;

        let stderr_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_task = tokio::spawn(capture_stderr(
            stderr,
            self.stderr_limit,
            Arc::clone(&stderr_buf),
        ));

        Ok(Box::new(TokioWorkerHandle {
            child,
            stdout: BufReader::new(stdout),
            pending: Vec::new(),
            line_limit: self.line_limit,
            discarding: false,
            stdout_done: false,
            stderr_task: Some(stderr_task),
            stderr_buf,
            exit: None,
        }))
    }
}

/// Drains stderr to EOF, keeping only the first `limit` bytes in `kept`.
///
/// Draining past the cap keeps the child from blocking on a full pipe.
async fn capture_stderr(
    mut stderr: ChildStderr,
    limit: usize,
    kept: Arc<Mutex<Vec<u8>>>,
) -> std::io::Result<()> {
    let mut buf = [0u8; 4096];
    loop {
        let n = stderr.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        let mut guard = kept.lock().unwrap_or_else(|e| e.into_inner());
        let room = limit.saturating_sub(guard.len());
        guard.extend_from_slice(&buf[..n.min(room)]);
    }
}

struct TokioWorkerHandle {
    child: Child,
    stdout: BufReader<ChildStdout>,
    /// Bytes of a line not yet terminated. Lives here so `next_line` stays
    /// cancel safe inside `select!`.
    pending: Vec<u8>,
    line_limit: usize,
    /// Skipping the rest of a line that ran past `line_limit`.
    discarding: bool,
    stdout_done: bool,
    stderr_task: Option<JoinHandle<std::io::Result<()>>>,
    stderr_buf: Arc<Mutex<Vec<u8>>>,
    exit: Option<WorkerExit>,
}

impl TokioWorkerHandle {
    fn take_line(&mut self) -> String {
        let mut line = std::mem::take(&mut self.pending);
        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        String::from_utf8_lossy(&line).into_owned()
    }

    /// Waits (bounded) for stderr to close and returns what was captured.
    async fn collect_stderr(&mut self) -> String {
        if let Some(mut task) = self.stderr_task.take() {
            match tokio::time::timeout(STDERR_GRACE, &mut task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => warn!("Failed to read worker stderr: {}", e),
                Ok(Err(e)) => warn!("Worker stderr task failed: {}", e),
                Err(_) => {
                    debug!("Worker stderr still open after exit, giving up on the rest");
                    task.abort();
                }
            }
        }
        let kept = self.stderr_buf.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&kept).into_owned()
    }
}

#[async_trait]
impl WorkerHandle for TokioWorkerHandle {
    async fn next_line(&mut self) -> Result<Option<String>, RunnerError> {
        if self.stdout_done {
            return Ok(None);
        }

        loop {
            let buf = self.stdout.fill_buf().await?;
            if buf.is_empty() {
                self.stdout_done = true;
                if std::mem::take(&mut self.discarding) {
                    return Err(RunnerError::LineTooLong {
                        limit: self.line_limit,
                    });
                }
                if self.pending.is_empty() {
                    return Ok(None);
                }
                // Final line without a trailing newline.
                return Ok(Some(self.take_line()));
            }

            let (used, complete) = match buf.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (buf.len(), false),
            };
            if !self.discarding {
                let content = if complete { used - 1 } else { used };
                if self.pending.len() + content > self.line_limit {
                    self.pending.clear();
                    self.discarding = true;
                } else {
                    self.pending.extend_from_slice(&buf[..used]);
                }
            }
            self.stdout.consume(used);

            if complete {
                if std::mem::take(&mut self.discarding) {
                    return Err(RunnerError::LineTooLong {
                        limit: self.line_limit,
                    });
                }
                return Ok(Some(self.take_line()));
            }
        }
    }

    async fn wait(&mut self) -> Result<WorkerExit, RunnerError> {
        if let Some(exit) = &self.exit {
            return Ok(exit.clone());
        }

        let status = self.child.wait().await?;
        let stderr = self.collect_stderr().await;
        let exit = WorkerExit {
            code: status.code(),
            success: status.success(),
            stderr,
        };
        self.exit = Some(exit.clone());
        Ok(exit)
    }

    async fn kill(&mut self) -> Result<(), RunnerError> {
        if self.exit.is_some() {
            return Ok(());
        }

        match self.child.kill().await {
            Ok(()) => {}
            // Already reaped.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(RunnerError::Io(e)),
        }

        let stderr = self.collect_stderr().await;
        self.exit = Some(WorkerExit {
            code: None,
            success: false,
            stderr,
        });
        Ok(())
    }

    fn id(&self) -> Option<u32> {
        self.child.id()
    }
}
