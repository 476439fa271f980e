use std::io::Write;
use std::net::TcpListener;
use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use tempfile::{NamedTempFile, TempDir};
use tokio::time::{sleep, timeout};

/// Find an available port
fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// A config whose worker is `/bin/sh <script>` writing under `output_root`.
fn worker_config(port: u16, script: &Path, output_root: &Path) -> String {
    format!(
        r#"
[server]
host = "127.0.0.1"
port = {}

[worker]
program = "/bin/sh"
args = [{:?}]
output_root = {:?}

[batch]
timeout_secs = 10
"#,
        port,
        script.display().to_string(),
        output_root.display().to_string()
    )
}

fn write_temp(contents: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(contents.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

/// Spawn the server and return a handle
async fn spawn_server(config_path: &Path) -> tokio::process::Child {
    tokio::process::Command::new(env!("CARGO_BIN_EXE_scribe-web"))
        .env("SCRIBE_CONFIG", config_path)
        .env("RUST_LOG", "error") // Quiet logs during tests
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn server")
}

/// Wait for server to be ready
async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    let client = Client::new();
    for _ in 0..max_attempts {
        if client
            .get(format!("http://127.0.0.1:{}/api/v1/health", port))
            .send()
            .await
            .is_ok()
        {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_health_endpoint() {
    let port = get_available_port();
    let output = TempDir::new().unwrap();
    let script = write_temp("exit 0\n");
    let config = write_temp(&worker_config(port, script.path(), output.path()));

    let mut server = spawn_server(config.path()).await;
    assert!(
        wait_for_server(port, 40).await,
        "Server did not start in time"
    );

    let response = Client::new()
        .get(format!("http://127.0.0.1:{}/api/v1/health", port))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let json: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(json["status"], "ok");

    server.kill().await.ok();
}

#[tokio::test]
async fn test_batch_streams_from_real_worker() {
    let port = get_available_port();
    let output = TempDir::new().unwrap();
    // $3 is the output root, $5 the bundle; identifiers follow `--` at $8.
    let script = write_temp(
        r#"dir="$3/$5"
shift 7
mkdir -p "$dir"
for id in "$@"; do
  printf '%s\n' '---' "title: \"Video $id\"" "video_id: \"$id\"" '---' > "$dir/$id.md"
  printf '{"event":"progress","video_id":"%s","status":"saved"}\n' "$id"
done
"#,
    );
    let config = write_temp(&worker_config(port, script.path(), output.path()));

    let mut server = spawn_server(config.path()).await;
    assert!(
        wait_for_server(port, 40).await,
        "Server did not start in time"
    );

    let response = timeout(
        Duration::from_secs(15),
        Client::new()
            .post(format!("http://127.0.0.1:{}/api/v1/batch", port))
            .json(&serde_json::json!({ "video_ids": ["a1", "a2"], "bundle": "Real Run" }))
            .send(),
    )
    .await
    .expect("Request timed out")
    .expect("Failed to send request");

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    let body = response.text().await.unwrap();
    assert_eq!(
        body,
        "data: {\"event\":\"progress\",\"video_id\":\"a1\",\"status\":\"saved\"}\n\n\
         data: {\"event\":\"progress\",\"video_id\":\"a2\",\"status\":\"saved\"}\n\n"
    );

    let index = std::fs::read_to_string(output.path().join("real_run").join("_index.md"))
        .expect("index regenerated after the batch");
    assert!(index.contains("Video a1"));
    assert!(index.contains("Video a2"));

    server.kill().await.ok();
}

#[tokio::test]
async fn test_missing_config_file_exits_with_error() {
    let result = timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_scribe-web"))
            .env("SCRIBE_CONFIG", "/nonexistent/config.toml")
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command");

    assert!(!result.status.success());
}

#[tokio::test]
async fn test_invalid_config_exits_with_error() {
    let config = write_temp(
        r#"
[server]
port = 8080

[batch]
timeout_secs = 0
"#,
    );

    let result = timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_scribe-web"))
            .env("SCRIBE_CONFIG", config.path())
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command");

    assert!(!result.status.success());
}
