//! Streaming batch endpoint.
//!
//! The worker is spawned before the response head goes out, so every failure
//! up to that point is a plain JSON error. After that the body is a stream of
//! server-sent event frames that ends when the batch does.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::stream;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::debug;

use scribe_core::ChannelSink;

use crate::metrics::{
    self, BATCHES_ACTIVE, BATCHES_REJECTED_TOTAL, BATCHES_STARTED_TOTAL,
    WORKER_SPAWN_FAILURES_TOTAL,
};
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// Runs one batch and streams its events.
///
/// The body is read as raw bytes so malformed JSON is reported the same way
/// as any other invalid request.
pub async fn start_batch(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let orchestrator = state.orchestrator();

    let batch = match orchestrator.validate(&body) {
        Ok(batch) => batch,
        Err(e) => {
            debug!("Rejected batch request: {}", e);
            BATCHES_REJECTED_TOTAL
                .with_label_values(&[metrics::rejection_reason(&e)])
                .inc();
            return error_response(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    let running = match orchestrator.start(batch).await {
        Ok(running) => running,
        Err(e) => {
            WORKER_SPAWN_FAILURES_TOTAL.inc();
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    BATCHES_STARTED_TOTAL.inc();
    BATCHES_ACTIVE.inc();

    let (mut sink, rx) = ChannelSink::channel(orchestrator.limits().channel_capacity);
    tokio::spawn(async move {
        let report = running.drive(&mut sink).await;
        drop(sink);
        metrics::record_batch(&report);
        BATCHES_ACTIVE.dec();
    });

    let frames = stream::unfold(rx, |mut rx| async move {
        let frame = rx.recv().await?;
        Some((Ok::<_, Infallible>(Bytes::from(frame)), rx))
    });

    let mut response = Response::new(Body::from_stream(frames));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

/// Any method other than POST on the batch path.
pub async fn method_not_allowed() -> Response {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}
