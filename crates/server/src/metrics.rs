//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the rup daemon:
//! - HTTP request metrics (latency, counts)
//! - Processor pool and backlog status (collected dynamically)
//! - Core dispatch and worker metrics from `rup_core::metrics`

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

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
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "rup_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("rup_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "rup_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Processor Metrics (collected dynamically)
// =============================================================================

/// Runs being processed.
pub static RUN_POOL_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("rup_run_pool_active", "Number of runs being processed").unwrap()
});

/// Runs waiting for a worker slot.
pub static RUN_POOL_QUEUED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "rup_run_pool_queued",
        "Number of dispatched runs waiting for a worker slot",
    )
    .unwrap()
});

/// Data files being unpacked.
pub static FILE_POOL_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "rup_file_pool_active",
        "Number of data files being staged and unpacked",
    )
    .unwrap()
});

/// Data files waiting for a slot.
pub static FILE_POOL_QUEUED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "rup_file_pool_queued",
        "Number of data files waiting for an unpack slot",
    )
    .unwrap()
});

/// Runs no rule matched.
pub static BACKLOG_LENGTH: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("rup_backlog_length", "Number of runs waiting for a matching rule").unwrap()
});

/// Runs still incomplete in the collector.
pub static RUNS_COLLECTING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "rup_runs_collecting",
        "Number of runs the collector is still waiting on",
    )
    .unwrap()
});

/// Persisted orphaned runs.
pub static ORPHANS_STORED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "rup_orphans_stored",
        "Number of orphaned runs in the orphan store",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

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

    // Processor
    registry
        .register(Box::new(RUN_POOL_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(RUN_POOL_QUEUED.clone()))
        .unwrap();
    registry
        .register(Box::new(FILE_POOL_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(FILE_POOL_QUEUED.clone()))
        .unwrap();
    registry.register(Box::new(BACKLOG_LENGTH.clone())).unwrap();
    registry.register(Box::new(RUNS_COLLECTING.clone())).unwrap();
    registry.register(Box::new(ORPHANS_STORED.clone())).unwrap();

    // Core metrics (dispatch, workers, publication)
    for metric in rup_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.processor().status();
    RUN_POOL_ACTIVE.set(status.run_pool.active_jobs as i64);
    RUN_POOL_QUEUED.set(status.run_pool.queued_jobs as i64);
    FILE_POOL_ACTIVE.set(status.file_pool.active_jobs as i64);
    FILE_POOL_QUEUED.set(status.file_pool.queued_jobs as i64);
    BACKLOG_LENGTH.set(status.backlog_len as i64);
    RUNS_COLLECTING.set(state.collector().tracked_runs().len() as i64);

    if let Some(orphans) = state.orphans() {
        if let Ok(count) = orphans.count() {
            ORPHANS_STORED.set(count);
        }
    }
}

/// Normalize a path for metric labels (replace run numbers and ids with placeholders).
pub fn normalize_path(path: &str) -> String {
    static NUMERIC: Lazy<regex_lite::Regex> =
        Lazy::new(|| regex_lite::Regex::new(r"/\d+(/|$)").unwrap());

    NUMERIC.replace_all(path, "/{id}$1").to_string()
}
