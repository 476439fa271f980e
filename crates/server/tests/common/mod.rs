//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with a mock process runner injected, so batches can be streamed without
//! spawning a real worker.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use scribe_core::{
    testing::{MockProcessRunner, ScriptedWorker},
    BatchOrchestrator, Config,
};

/// Re-export fixtures for test convenience
pub use scribe_core::testing::fixtures;

/// Test fixture for E2E testing with a mock worker.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_batch() {
///     let fixture = TestFixture::with_script(ScriptedWorker::new().line("...")).await;
///
///     let response = fixture.post_stream("/api/v1/batch", json!({
///         "video_ids": ["abc"],
///         "bundle": "talks"
///     })).await;
///
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock runner - script worker output, count spawns
    pub runner: Arc<MockProcessRunner>,
    /// Output root for bundles
    pub temp_dir: TempDir,
}

/// A buffered JSON response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// A response whose body was read to the end as text.
#[derive(Debug)]
pub struct StreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl StreamResponse {
    /// Raw `data:` frames, in order.
    pub fn frames(&self) -> Vec<&str> {
        self.body
            .split_terminator("\n\n")
            .collect()
    }

    /// Decoded event payloads, in order.
    pub fn events(&self) -> Vec<Value> {
        self.frames()
            .into_iter()
            .map(|frame| {
                let json = frame
                    .strip_prefix("data: ")
                    .unwrap_or_else(|| panic!("not an SSE data frame: {:?}", frame));
                serde_json::from_str(json).expect("frame is not JSON")
            })
            .collect()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_script(ScriptedWorker::new()).await
    }

    pub async fn with_script(script: ScriptedWorker) -> Self {
        Self::with_config(script, |_| {}).await
    }

    pub async fn with_config(script: ScriptedWorker, tweak: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = fixtures::config_with_output_root(temp_dir.path());
        config.server.host = std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);
        tweak(&mut config);

        let runner = Arc::new(MockProcessRunner::with_script(script));
        let orchestrator = Arc::new(BatchOrchestrator::new(&config, runner.clone()));

        let state = Arc::new(scribe_server::state::AppState::new(config, orchestrator));
        let router = scribe_server::api::create_router(state);

        Self {
            router,
            runner,
            temp_dir,
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, Body::empty()).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Body::from(body.to_string())).await
    }

    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        self.request("POST", path, Body::from(body.to_string())).await
    }

    pub async fn request(&self, method: &str, path: &str, body: Body) -> TestResponse {
        let response = self.send(method, path, body).await;
        let body = if response.body.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&response.body).unwrap_or(Value::String(response.body))
        };

        TestResponse {
            status: response.status,
            body,
        }
    }

    /// POSTs a JSON body and reads the streamed response to the end.
    pub async fn post_stream(&self, path: &str, body: Value) -> StreamResponse {
        self.send("POST", path, Body::from(body.to_string())).await
    }

    async fn send(&self, method: &str, path: &str, body: Body) -> StreamResponse {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("Content-Type", "application/json")
            .body(body)
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();

        StreamResponse {
            status,
            headers,
            body: String::from_utf8(bytes.to_vec()).expect("body is not UTF-8"),
        }
    }
}
