//! Prometheus metrics for observability.
//!
//! - HTTP request metrics (latency, counts, in flight)
//! - Batch lifecycle (started, finished by outcome, active, duration)
//! - Event relay (forwarded by kind, dropped worker lines, spawn failures)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    Opts, Registry, TextEncoder,
};
use regex_lite::Regex;
use scribe_core::{BatchReport, ValidationError};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
///
/// For the batch endpoint this covers the time to the response head only.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "scribe_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("scribe_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "scribe_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Batch Metrics
// =============================================================================

/// Batches whose worker was spawned.
pub static BATCHES_STARTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "scribe_batches_started_total",
        "Total batches started since startup",
    )
    .unwrap()
});

/// Batch requests rejected before spawning.
pub static BATCHES_REJECTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "scribe_batches_rejected_total",
            "Batch requests rejected by validation",
        ),
        &["reason"],
    )
    .unwrap()
});

/// Finished batches by outcome.
pub static BATCHES_FINISHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("scribe_batches_finished_total", "Finished batches"),
        &["outcome"],
    )
    .unwrap()
});

/// Batches with a live worker.
pub static BATCHES_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "scribe_batches_active",
        "Number of batches currently streaming",
    )
    .unwrap()
});

/// Wall-clock time from spawn to the end of the stream.
pub static BATCH_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "scribe_batch_duration_seconds",
            "Batch duration in seconds",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0]),
    )
    .unwrap()
});

// =============================================================================
// Relay Metrics
// =============================================================================

/// Events delivered to clients by kind.
pub static EVENTS_FORWARDED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("scribe_events_forwarded_total", "Events forwarded to clients"),
        &["event"],
    )
    .unwrap()
});

/// Worker stdout lines that did not decode as events.
pub static DECODE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "scribe_decode_failures_total",
        "Worker output lines dropped as undecodable",
    )
    .unwrap()
});

/// Worker processes that could not be started.
pub static WORKER_SPAWN_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "scribe_worker_spawn_failures_total",
        "Worker processes that failed to spawn",
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Batches
    registry
        .register(Box::new(BATCHES_STARTED_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(BATCHES_REJECTED_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(BATCHES_FINISHED_TOTAL.clone()))
        .unwrap();
    registry.register(Box::new(BATCHES_ACTIVE.clone())).unwrap();
    registry.register(Box::new(BATCH_DURATION.clone())).unwrap();

    // Relay
    registry
        .register(Box::new(EVENTS_FORWARDED_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(DECODE_FAILURES_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WORKER_SPAWN_FAILURES_TOTAL.clone()))
        .unwrap();
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Label for a rejected batch request.
pub fn rejection_reason(error: &ValidationError) -> &'static str {
    match error {
        ValidationError::InvalidRequest => "invalid_request",
        ValidationError::MissingIdentifiers => "missing_identifiers",
        ValidationError::MissingBundleName => "missing_bundle_name",
        ValidationError::TooManyIdentifiers { .. } => "too_many_identifiers",
        ValidationError::InvalidIdentifier { .. } => "invalid_identifier",
        ValidationError::InvalidLanguage { .. } => "invalid_language",
    }
}

/// Folds a finished batch into the counters.
pub fn record_batch(report: &BatchReport) {
    BATCHES_FINISHED_TOTAL
        .with_label_values(&[report.outcome.as_str()])
        .inc();
    BATCH_DURATION.observe(report.elapsed.as_secs_f64());
    for (kind, count) in &report.forwarded {
        EVENTS_FORWARDED_TOTAL
            .with_label_values(&[*kind])
            .inc_by(*count);
    }
    DECODE_FAILURES_TOTAL.inc_by(report.decode_failures);
}

static UUID_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});
static NUMERIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = UUID_SEGMENT.replace_all(path, "{id}");
    let result = NUMERIC_SEGMENT.replace_all(&result, "/{id}$1");
    result.to_string()
}
