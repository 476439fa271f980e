//! Mock process runner for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::events::ProgressEvent;
use crate::worker::{ProcessRunner, RunnerError, WorkerExit, WorkerHandle, WorkerInvocation};

/// What a mock worker prints and how it exits.
#[derive(Debug, Clone, Default)]
pub struct ScriptedWorker {
    lines: Vec<String>,
    line_delay: Duration,
    exit_code: i32,
    stderr: String,
    hang: bool,
    linger: bool,
}

impl ScriptedWorker {
    /// A worker that prints nothing and exits 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a raw stdout line.
    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    /// Appends an event serialized the way the real worker prints it.
    pub fn event(self, event: &ProgressEvent) -> Self {
        let line = serde_json::to_string(event).unwrap_or_default();
        self.line(line)
    }

    /// Sleeps before each line.
    pub fn line_delay(mut self, delay: Duration) -> Self {
        self.line_delay = delay;
        self
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// Keeps stdout open after the scripted lines until killed.
    pub fn hang(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Closes stdout after the scripted lines but never exits until killed.
    pub fn linger(mut self) -> Self {
        self.linger = true;
        self
    }
}

/// Mock implementation of the ProcessRunner trait.
///
/// Every spawn plays the current [`ScriptedWorker`]. Invocations and kills
/// are recorded for assertions.
///
/// # Example
///
/// ```rust,ignore
/// use scribe_core::testing::{MockProcessRunner, ScriptedWorker};
///
/// let runner = MockProcessRunner::new();
/// runner.set_script(ScriptedWorker::new().line("{\"event\":\"progress\"}")).await;
///
/// let handle = runner.spawn(&invocation).await?;
/// assert_eq!(runner.spawn_count().await, 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockProcessRunner {
    script: Arc<RwLock<ScriptedWorker>>,
    invocations: Arc<RwLock<Vec<WorkerInvocation>>>,
    /// If set, spawns fail as if the OS returned this error.
    spawn_error: Arc<RwLock<Option<io::ErrorKind>>>,
    kills: Arc<AtomicUsize>,
}

impl Default for MockProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self::with_script(ScriptedWorker::new())
    }

    pub fn with_script(script: ScriptedWorker) -> Self {
        Self {
            script: Arc::new(RwLock::new(script)),
            invocations: Arc::new(RwLock::new(Vec::new())),
            spawn_error: Arc::new(RwLock::new(None)),
            kills: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn set_script(&self, script: ScriptedWorker) {
        *self.script.write().await = script;
    }

    /// Makes subsequent spawns fail.
    pub async fn fail_spawn(&self, kind: io::ErrorKind) {
        *self.spawn_error.write().await = Some(kind);
    }

    /// Invocations seen so far, including failed spawns.
    pub async fn invocations(&self) -> Vec<WorkerInvocation> {
        self.invocations.read().await.clone()
    }

    pub async fn spawn_count(&self) -> usize {
        self.invocations.read().await.len()
    }

    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    fn name(&self) -> &str {
        "mock"
    }

    async fn spawn(
        &self,
        invocation: &WorkerInvocation,
    ) -> Result<Box<dyn WorkerHandle>, RunnerError> {
        self.invocations.write().await.push(invocation.clone());

        if let Some(kind) = *self.spawn_error.read().await {
            return Err(RunnerError::from_spawn(
                &invocation.program,
                io::Error::from(kind),
            ));
        }

        let script = self.script.read().await.clone();
        Ok(Box::new(MockWorkerHandle {
            lines: script.lines.into(),
            line_delay: script.line_delay,
            exit_code: script.exit_code,
            stderr: script.stderr,
            hang: script.hang,
            linger: script.linger,
            killed: false,
            kills: Arc::clone(&self.kills),
        }))
    }
}

struct MockWorkerHandle {
    lines: VecDeque<String>,
    line_delay: Duration,
    exit_code: i32,
    stderr: String,
    hang: bool,
    linger: bool,
    killed: bool,
    kills: Arc<AtomicUsize>,
}

#[async_trait]
impl WorkerHandle for MockWorkerHandle {
    async fn next_line(&mut self) -> Result<Option<String>, RunnerError> {
        if self.killed {
            return Ok(None);
        }
        if !self.lines.is_empty() {
            if !self.line_delay.is_zero() {
                tokio::time::sleep(self.line_delay).await;
            }
            return Ok(self.lines.pop_front());
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        Ok(None)
    }

    async fn wait(&mut self) -> Result<WorkerExit, RunnerError> {
        if self.killed {
            return Ok(WorkerExit {
                code: None,
                success: false,
                stderr: self.stderr.clone(),
            });
        }
        if self.hang || self.linger {
            std::future::pending::<()>().await;
        }
        if self.exit_code == 0 {
            Ok(WorkerExit {
                stderr: self.stderr.clone(),
                ..WorkerExit::success()
            })
        } else {
            Ok(WorkerExit::failure(self.exit_code, self.stderr.clone()))
        }
    }

    async fn kill(&mut self) -> Result<(), RunnerError> {
        if !self.killed {
            self.killed = true;
            self.kills.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn id(&self) -> Option<u32> {
        Some(4242)
    }
}
