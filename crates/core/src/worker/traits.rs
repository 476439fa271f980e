//! Trait definitions for the worker module.

use async_trait::async_trait;

use super::error::RunnerError;
use super::invocation::WorkerInvocation;

/// How the worker ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
    /// Exit code, or `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub success: bool,
    /// Captured stderr (possibly truncated to the runner's cap).
    pub stderr: String,
}

impl WorkerExit {
    pub fn success() -> Self {
        Self {
            code: Some(0),
            success: true,
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            success: false,
            stderr: stderr.into(),
        }
    }
}

/// A running worker process.
///
/// Stdout is a lazy, finite, non-restartable sequence of lines. Dropping the
/// handle must terminate the process.
#[async_trait]
pub trait WorkerHandle: Send {
    /// Waits for the next stdout line. `Ok(None)` once stdout is closed.
    async fn next_line(&mut self) -> Result<Option<String>, RunnerError>;

    /// Waits for the process to exit and returns its status and stderr.
    async fn wait(&mut self) -> Result<WorkerExit, RunnerError>;

    /// Forcibly terminates the process and reaps it.
    async fn kill(&mut self) -> Result<(), RunnerError>;

    /// OS process id, when there is one.
    fn id(&self) -> Option<u32> {
        None
    }
}

/// Something that can launch the worker.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Returns the name of this runner implementation.
    fn name(&self) -> &str;

    /// Spawns exactly one process for the invocation.
    async fn spawn(
        &self,
        invocation: &WorkerInvocation,
    ) -> Result<Box<dyn WorkerHandle>, RunnerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct ScriptedHandle {
        lines: VecDeque<String>,
    }

    #[async_trait]
    impl WorkerHandle for ScriptedHandle {
        async fn next_line(&mut self) -> Result<Option<String>, RunnerError> {
            Ok(self.lines.pop_front())
        }

        async fn wait(&mut self) -> Result<WorkerExit, RunnerError> {
            Ok(WorkerExit::success())
        }

        async fn kill(&mut self) -> Result<(), RunnerError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_handle_drains_in_order() {
        let mut handle: Box<dyn WorkerHandle> = Box::new(ScriptedHandle {
            lines: VecDeque::from(vec!["a".to_string(), "b".to_string()]),
        });
        assert_eq!(handle.next_line().await.unwrap().as_deref(), Some("a"));
        assert_eq!(handle.next_line().await.unwrap().as_deref(), Some("b"));
        assert_eq!(handle.next_line().await.unwrap(), None);
        assert!(handle.wait().await.unwrap().success);
        assert_eq!(handle.id(), None);
    }

    #[test]
    fn test_worker_exit_constructors() {
        let exit = WorkerExit::failure(2, "rate limited");
        assert!(!exit.success);
        assert_eq!(exit.code, Some(2));
        assert_eq!(exit.stderr, "rate limited");
    }
}
