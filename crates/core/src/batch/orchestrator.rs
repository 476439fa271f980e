//! Drives one worker process per batch and relays its events to a sink.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::outcome::{BatchOutcome, BatchReport, BatchStatus, BatchTally};
use super::request::{ValidatedBatch, ValidationError};
use super::sink::{SinkError, StreamSink};
use crate::bundle::{BundleIndexer, BundleName};
use crate::config::{BatchConfig, Config, WorkerConfig};
use crate::events::{translate, ProgressEvent};
use crate::worker::{ProcessRunner, RunnerError, WorkerExit, WorkerHandle, WorkerInvocation};

/// How long a terminal error event may wait on a slow client.
const TERMINAL_EMIT_GRACE: Duration = Duration::from_secs(5);

/// Stand-in deadline when the ceiling does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Errors that end a batch before any event is streamed.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to start worker: {0}")]
    Spawn(#[source] RunnerError),
}

impl BatchError {
    /// Whether the request itself was at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Validates batch requests and launches their workers.
///
/// Holds only immutable configuration and the runner, so one instance serves
/// any number of concurrent requests.
pub struct BatchOrchestrator {
    worker: WorkerConfig,
    limits: BatchConfig,
    runner: Arc<dyn ProcessRunner>,
    indexer: BundleIndexer,
}

impl BatchOrchestrator {
    pub fn new(config: &Config, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            worker: config.worker.clone(),
            limits: config.batch.clone(),
            runner,
            indexer: BundleIndexer::new(),
        }
    }

    /// Replaces the indexer used for the post-exit reconcile.
    pub fn with_indexer(mut self, indexer: BundleIndexer) -> Self {
        self.indexer = indexer;
        self
    }

    pub fn limits(&self) -> &BatchConfig {
        &self.limits
    }

    pub fn runner_name(&self) -> &str {
        self.runner.name()
    }

    /// Directory a bundle's documents live in.
    pub fn bundle_dir(&self, bundle: &BundleName) -> PathBuf {
        self.worker.output_root.join(bundle.as_str())
    }

    /// Checks a raw request body. Spawns nothing.
    pub fn validate(&self, body: &[u8]) -> Result<ValidatedBatch, ValidationError> {
        ValidatedBatch::parse(body, &self.limits)
    }

    /// Spawns the worker for a validated batch.
    ///
    /// The wall-clock ceiling starts counting here.
    pub async fn start(&self, batch: ValidatedBatch) -> Result<RunningBatch, BatchError> {
        let batch_id = Uuid::new_v4();
        let invocation = WorkerInvocation::batch(
            &self.worker,
            &batch.bundle,
            &batch.languages,
            &batch.video_ids,
        );

        let handle = self.runner.spawn(&invocation).await.map_err(|e| {
            error!(%batch_id, "Failed to spawn worker: {}", e);
            BatchError::Spawn(e)
        })?;

        info!(
            %batch_id,
            bundle = %batch.bundle,
            videos = batch.video_ids.len(),
            pid = ?handle.id(),
            "Batch started"
        );

        let timeout = self.limits.timeout();
        let now = tokio::time::Instant::now();
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let reindex_dir = self
            .limits
            .reindex_on_exit
            .then(|| self.bundle_dir(&batch.bundle));

        Ok(RunningBatch {
            id: batch_id,
            batch,
            handle,
            timeout,
            started: Instant::now(),
            deadline,
            reindex_dir,
            indexer: self.indexer.clone(),
        })
    }

    /// Validates, spawns, and drives a batch to completion.
    pub async fn run<S: StreamSink + ?Sized>(
        &self,
        body: &[u8],
        sink: &mut S,
    ) -> Result<BatchReport, BatchError> {
        let batch = self.validate(body)?;
        Ok(self.start(batch).await?.drive(sink).await)
    }
}

/// A batch whose worker is running.
///
/// Dropping it kills the worker.
pub struct RunningBatch {
    id: Uuid,
    batch: ValidatedBatch,
    handle: Box<dyn WorkerHandle>,
    timeout: Duration,
    started: Instant,
    deadline: tokio::time::Instant,
    reindex_dir: Option<PathBuf>,
    indexer: BundleIndexer,
}

/// What woke the relay loop.
enum Step {
    Line(Result<Option<String>, RunnerError>),
    Deadline,
    ClientGone,
}

/// What ended the wait for the worker's exit.
enum Settled {
    Exited(Result<WorkerExit, RunnerError>),
    Deadline,
    ClientGone,
}

enum Forwarded {
    Delivered,
    ClientGone,
    DeadlinePassed,
}

#[derive(Default)]
struct Relay {
    tally: BatchTally,
    forwarded: BTreeMap<&'static str, u64>,
    decode_failures: u64,
}

impl Relay {
    fn delivered(&mut self, event: &ProgressEvent) {
        *self.forwarded.entry(event.kind()).or_default() += 1;
        self.tally.record(event);
    }
}

impl RunningBatch {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn bundle(&self) -> &BundleName {
        &self.batch.bundle
    }

    /// Relays worker output to `sink` until the worker exits, the deadline
    /// passes, or the client goes away.
    ///
    /// Events are forwarded one at a time in arrival order. Lines that do not
    /// decode are dropped. The worker is never left running when this
    /// returns.
    pub async fn drive<S: StreamSink + ?Sized>(self, sink: &mut S) -> BatchReport {
        let span = info_span!("batch", batch_id = %self.id, bundle = %self.batch.bundle);
        self.drive_inner(sink).instrument(span).await
    }

    async fn drive_inner<S: StreamSink + ?Sized>(mut self, sink: &mut S) -> BatchReport {
        let mut relay = Relay::default();
        let outcome = self.relay_output(sink, &mut relay).await;
        let indexed_documents = self.reconcile_index().await;

        let report = BatchReport {
            batch_id: self.id,
            bundle: self.batch.bundle.clone(),
            requested: self.batch.video_ids.len(),
            tally: relay.tally,
            forwarded: relay.forwarded,
            decode_failures: relay.decode_failures,
            outcome,
            indexed_documents,
            elapsed: self.started.elapsed(),
        };

        let summary = format!(
            "saved={} skipped={} failed={} forwarded={} dropped_lines={} elapsed_ms={}",
            report.tally.saved,
            report.tally.skipped,
            report.tally.failed,
            report.forwarded_total(),
            report.decode_failures,
            report.elapsed.as_millis()
        );
        match report.status() {
            BatchStatus::Success => info!(outcome = outcome.as_str(), "Batch finished: {}", summary),
            BatchStatus::PartialFailure => {
                info!(outcome = outcome.as_str(), "Batch finished with failures: {}", summary)
            }
            BatchStatus::Fatal => warn!(outcome = outcome.as_str(), "Batch failed: {}", summary),
        }

        report
    }

    async fn relay_output<S: StreamSink + ?Sized>(
        &mut self,
        sink: &mut S,
        relay: &mut Relay,
    ) -> BatchOutcome {
        loop {
            let step = tokio::select! {
                biased;
                _ = tokio::time::sleep_until(self.deadline) => Step::Deadline,
                _ = sink.closed() => Step::ClientGone,
                line = self.handle.next_line() => Step::Line(line),
            };

            match step {
                Step::Deadline => return self.time_out(sink, relay).await,
                Step::ClientGone => return self.client_gone().await,
                Step::Line(Ok(Some(line))) => match translate(&line) {
                    Ok(Some(event)) => match self.forward(sink, relay, event).await {
                        Forwarded::Delivered => {}
                        Forwarded::ClientGone => return self.client_gone().await,
                        Forwarded::DeadlinePassed => return self.time_out(sink, relay).await,
                    },
                    Ok(None) => {}
                    Err(e) => {
                        relay.decode_failures += 1;
                        debug!("Dropping worker line: {}", e);
                    }
                },
                Step::Line(Ok(None)) => break,
                Step::Line(Err(e @ RunnerError::LineTooLong { .. })) => {
                    relay.decode_failures += 1;
                    debug!("Dropping worker line: {}", e);
                }
                Step::Line(Err(e)) => {
                    warn!("Failed to read worker output: {}", e);
                    break;
                }
            }
        }

        self.settle_exit(sink, relay).await
    }

    async fn forward<S: StreamSink + ?Sized>(
        &mut self,
        sink: &mut S,
        relay: &mut Relay,
        event: ProgressEvent,
    ) -> Forwarded {
        match tokio::time::timeout_at(self.deadline, sink.emit(&event)).await {
            Ok(Ok(())) => {
                relay.delivered(&event);
                Forwarded::Delivered
            }
            Ok(Err(SinkError::Closed)) => Forwarded::ClientGone,
            Ok(Err(e)) => {
                warn!("Failed to forward {} event: {}", event.kind(), e);
                Forwarded::Delivered
            }
            Err(_) => Forwarded::DeadlinePassed,
        }
    }

    /// Stdout is drained; collect the exit status and report failures.
    ///
    /// The worker may keep running after closing stdout, so the deadline and
    /// the client still apply here.
    async fn settle_exit<S: StreamSink + ?Sized>(
        &mut self,
        sink: &mut S,
        relay: &mut Relay,
    ) -> BatchOutcome {
        let settled = tokio::select! {
            biased;
            _ = tokio::time::sleep_until(self.deadline) => Settled::Deadline,
            exit = self.handle.wait() => Settled::Exited(exit),
            _ = sink.closed() => Settled::ClientGone,
        };

        let exit = match settled {
            Settled::Exited(Ok(exit)) => exit,
            Settled::Exited(Err(e)) => {
                warn!("Failed to wait for worker: {}", e);
                self.kill_worker().await;
                let event = ProgressEvent::error(format!("worker failed: {}", e));
                self.emit_terminal(sink, relay, event).await;
                return BatchOutcome::WorkerFailed { code: None };
            }
            Settled::Deadline => return self.time_out(sink, relay).await,
            Settled::ClientGone => return self.client_gone().await,
        };

        if exit.success {
            debug!("Worker exited cleanly");
            return BatchOutcome::Completed;
        }

        warn!(code = ?exit.code, "Worker exited with failure");
        let stderr = exit.stderr.trim();
        if !stderr.is_empty() {
            self.emit_terminal(sink, relay, ProgressEvent::error(stderr))
                .await;
        }
        BatchOutcome::WorkerFailed { code: exit.code }
    }

    async fn time_out<S: StreamSink + ?Sized>(
        &mut self,
        sink: &mut S,
        relay: &mut Relay,
    ) -> BatchOutcome {
        let secs = self.timeout.as_secs();
        warn!("Batch exceeded {}s, killing worker", secs);
        self.kill_worker().await;
        let event = ProgressEvent::error(format!("batch timed out after {} seconds", secs));
        self.emit_terminal(sink, relay, event).await;
        BatchOutcome::TimedOut
    }

    async fn client_gone(&mut self) -> BatchOutcome {
        info!("Client disconnected, killing worker");
        self.kill_worker().await;
        BatchOutcome::ClientGone
    }

    async fn kill_worker(&mut self) {
        if let Err(e) = self.handle.kill().await {
            warn!("Failed to kill worker: {}", e);
        }
    }

    /// Best-effort delivery of a closing error event.
    async fn emit_terminal<S: StreamSink + ?Sized>(
        &mut self,
        sink: &mut S,
        relay: &mut Relay,
        event: ProgressEvent,
    ) {
        match tokio::time::timeout(TERMINAL_EMIT_GRACE, sink.emit(&event)).await {
            Ok(Ok(())) => relay.delivered(&event),
            Ok(Err(e)) => debug!("Terminal event not delivered: {}", e),
            Err(_) => debug!("Terminal event not delivered within {:?}", TERMINAL_EMIT_GRACE),
        }
    }

    /// Regenerates the bundle index from disk once the worker is gone.
    async fn reconcile_index(&mut self) -> Option<usize> {
        let dir = self.reindex_dir.clone()?;
        if !tokio::fs::metadata(&dir).await.is_ok_and(|m| m.is_dir()) {
            debug!("Bundle directory {:?} does not exist, skipping reindex", dir);
            return None;
        }

        let indexer = self.indexer.clone();
        match tokio::task::spawn_blocking(move || indexer.regenerate(&dir)).await {
            Ok(Ok(doc)) => {
                debug!(
                    entries = doc.entries.len(),
                    written = doc.written,
                    "Bundle index reconciled"
                );
                Some(doc.entries.len())
            }
            Ok(Err(e)) => {
                warn!("Failed to regenerate bundle index: {}", e);
                None
            }
            Err(e) => {
                warn!("Index regeneration task failed: {}", e);
                None
            }
        }
    }
}
