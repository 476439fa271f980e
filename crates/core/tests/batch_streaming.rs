//! Batch streaming integration tests.
//!
//! These drive real `/bin/sh` workers through the orchestrator and a channel
//! sink, the same path the HTTP handler takes.
#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use scribe_core::{
    batch::encode_sse_frame,
    testing::{fixtures, RecordingSink},
    BatchOrchestrator, BatchOutcome, BatchReport, ChannelSink, Config, ProgressEvent,
    ProgressStatus, TokioProcessRunner,
};

/// Arguments after the script name: `batch --output <root> --bundle <name> --jsonl -- <ids..>`.
/// `shift 7` leaves only the identifiers.
const ECHO_IDS: &str = r#"shift 7
for id in "$@"; do
  printf '{"event":"progress","video_id":"%s","status":"saved"}\n' "$id"
done"#;

struct TestHarness {
    config: Config,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new(script: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = fixtures::config_with_output_root(temp_dir.path());
        config.worker.program = "/bin/sh".into();
        config.worker.args = vec!["-c".to_string(), script.to_string(), "worker".to_string()];

        Self {
            config,
            _temp_dir: temp_dir,
        }
    }

    fn with_timeout(mut self, secs: u64) -> Self {
        self.config.batch.timeout_secs = secs;
        self
    }

    fn with_line_limit(mut self, bytes: usize) -> Self {
        self.config.worker.line_limit_bytes = bytes;
        self
    }

    fn orchestrator(&self) -> BatchOrchestrator {
        let runner = TokioProcessRunner::from_config(&self.config.worker);
        BatchOrchestrator::new(&self.config, Arc::new(runner))
    }

    async fn run(&self, ids: &[&str], bundle: &str) -> (Vec<ProgressEvent>, BatchReport) {
        let mut sink = RecordingSink::new();
        let report = tokio::time::timeout(
            Duration::from_secs(20),
            self.orchestrator()
                .run(&fixtures::batch_body(ids, bundle), &mut sink),
        )
        .await
        .expect("batch did not finish")
        .expect("batch failed to start");
        (sink.events().await, report)
    }
}

fn progress_ids(events: &[ProgressEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Progress { video_id, .. } => Some(video_id.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_every_progress_line_is_relayed_in_order() {
    let harness = TestHarness::new(ECHO_IDS);
    let ids = ["aaaaaaaaaaa", "bbbbbbbbbbb", "ccccccccccc", "ddddddddddd"];

    let (events, report) = harness.run(&ids, "Talks").await;

    assert_eq!(progress_ids(&events), ids);
    assert!(events.iter().all(|e| matches!(
        e,
        ProgressEvent::Progress {
            status: ProgressStatus::Saved,
            ..
        }
    )));
    assert_eq!(report.outcome, BatchOutcome::Completed);
    assert_eq!(report.tally.saved, 4);
}

#[tokio::test]
async fn test_noise_between_events_is_invisible() {
    let clean = TestHarness::new(
        r#"echo '{"event":"progress","video_id":"a1","status":"saved"}'
echo '{"event":"progress","video_id":"a2","status":"skipped"}'"#,
    );
    let noisy = TestHarness::new(
        r#"echo 'Fetching a1...'
echo '{"event":"progress","video_id":"a1","status":"saved"}'
echo '{"event":"progress",'
echo ''
echo '[1, 2, 3]'
echo '{"event":"progress","video_id":"a2","status":"skipped"}'
echo 'done.'"#,
    );

    let (clean_events, _) = clean.run(&["a1", "a2"], "b").await;
    let (noisy_events, report) = noisy.run(&["a1", "a2"], "b").await;

    assert_eq!(clean_events, noisy_events);
    assert_eq!(report.decode_failures, 4);
    assert_eq!(report.outcome, BatchOutcome::Completed);
}

#[tokio::test]
async fn test_stderr_becomes_terminal_error() {
    let harness = TestHarness::new(
        r#"echo '{"event":"progress","video_id":"a1","status":"saved"}'
echo '{"event":"progress","video_id":"a2","status":"error","error":"no captions"}'
echo 'rate limited' >&2
exit 1"#,
    );

    let (events, report) = harness.run(&["a1", "a2", "a3"], "b").await;

    assert_eq!(events.len(), 3);
    assert_eq!(progress_ids(&events[..2]), ["a1", "a2"]);
    assert_eq!(events[2], ProgressEvent::error("rate limited"));
    assert_eq!(
        encode_sse_frame(&events[2]).unwrap(),
        "data: {\"event\":\"error\",\"message\":\"rate limited\"}\n\n"
    );
    assert_eq!(report.outcome, BatchOutcome::WorkerFailed { code: Some(1) });
    assert_eq!(report.tally.failed, 1);
}

#[tokio::test]
async fn test_hung_worker_is_terminated_at_deadline() {
    let harness = TestHarness::new(
        r#"echo '{"event":"progress","video_id":"a1","status":"saved"}'
exec sleep 30"#,
    )
    .with_timeout(1);

    let (events, report) = harness.run(&["a1", "a2"], "b").await;

    assert_eq!(progress_ids(&events), ["a1"]);
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::error("batch timed out after 1 seconds"))
    );
    assert_eq!(report.outcome, BatchOutcome::TimedOut);
    assert!(report.elapsed < Duration::from_secs(10));
}

#[tokio::test]
async fn test_client_disconnect_terminates_worker() {
    let harness = TestHarness::new(
        r#"echo '{"event":"progress","video_id":"a1","status":"saved"}'
exec sleep 30"#,
    );
    let orchestrator = harness.orchestrator();
    let (mut sink, mut rx) = ChannelSink::channel(4);

    let driver = tokio::spawn(async move {
        orchestrator
            .run(&fixtures::batch_body(&["a1", "a2"], "b"), &mut sink)
            .await
    });

    let first = rx.recv().await.expect("first frame");
    assert!(first.starts_with("data: {\"event\":\"progress\""));
    drop(rx);

    let report = tokio::time::timeout(Duration::from_secs(5), driver)
        .await
        .expect("disconnect should end the batch")
        .unwrap()
        .unwrap();
    assert_eq!(report.outcome, BatchOutcome::ClientGone);
}

#[tokio::test]
async fn test_client_disconnect_after_stdout_closed_terminates_worker() {
    let harness = TestHarness::new(
        r#"echo '{"event":"progress","video_id":"a1","status":"saved"}'
exec 1>&-
exec sleep 30"#,
    );
    let orchestrator = harness.orchestrator();
    let (mut sink, mut rx) = ChannelSink::channel(4);

    let driver = tokio::spawn(async move {
        orchestrator
            .run(&fixtures::batch_body(&["a1"], "b"), &mut sink)
            .await
    });

    let first = rx.recv().await.expect("first frame");
    assert!(first.contains("\"a1\""));
    tokio::time::sleep(Duration::from_millis(300)).await;
    drop(rx);

    let report = tokio::time::timeout(Duration::from_secs(5), driver)
        .await
        .expect("disconnect should end the batch while the worker lingers")
        .unwrap()
        .unwrap();
    assert_eq!(report.outcome, BatchOutcome::ClientGone);
    assert_eq!(report.tally.saved, 1);
}

#[tokio::test]
async fn test_oversized_line_is_dropped_and_counted() {
    let harness = TestHarness::new(
        r#"printf '%05000d\n' 0
echo '{"event":"progress","video_id":"a1","status":"saved"}'"#,
    )
    .with_line_limit(1024);

    let (events, report) = harness.run(&["a1"], "b").await;

    assert_eq!(progress_ids(&events), ["a1"]);
    assert_eq!(report.decode_failures, 1);
    assert_eq!(report.outcome, BatchOutcome::Completed);
}

#[tokio::test]
async fn test_identifiers_are_passed_verbatim() {
    let harness = TestHarness::new(ECHO_IDS);
    let ids = ["-rf", "a;touch${IFS}pwned", "$(id)", "https://youtu.be/abc?t=1"];

    let (events, _) = harness.run(&ids, "b").await;

    assert_eq!(progress_ids(&events), ids);
}

#[tokio::test]
async fn test_documents_written_by_worker_are_indexed() {
    let harness = TestHarness::new(
        r#"dir="$3/$5"
mkdir -p "$dir"
printf '%s\n' '---' 'title: "Opening Keynote"' 'video_id: "a1"' '---' '' 'Hello.' > "$dir/opening-keynote.md"
echo '{"event":"progress","video_id":"a1","status":"saved","path":"opening-keynote.md"}'"#,
    );

    let (events, report) = harness.run(&["a1"], "Conf 2024").await;

    assert_eq!(progress_ids(&events), ["a1"]);
    assert_eq!(report.indexed_documents, Some(1));

    let index_path = harness
        .config
        .worker
        .output_root
        .join("conf_2024")
        .join("_index.md");
    let index = std::fs::read_to_string(index_path).unwrap();
    assert!(index.contains("Opening Keynote"));
    assert!(index.contains("a1"));
}

#[tokio::test]
async fn test_successive_batches_accumulate_in_bundle() {
    let script = r#"dir="$3/$5"
shift 7
mkdir -p "$dir"
for id in "$@"; do
  printf '%s\n' '---' "title: \"Video $id\"" "video_id: \"$id\"" '---' > "$dir/$id.md"
  printf '{"event":"progress","video_id":"%s","status":"saved"}\n' "$id"
done"#;
    let harness = TestHarness::new(script);

    let (_, first) = harness.run(&["a1", "a2"], "shared").await;
    let (_, second) = harness.run(&["b1"], "shared").await;

    assert_eq!(first.indexed_documents, Some(2));
    assert_eq!(second.indexed_documents, Some(3));
}
