//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Dispatch (matched and unmatched runs, run duration)
//! - Workers (registered files, unpacking, image pulls)
//! - Publication (tracking database outcome)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Dispatch Metrics
// =============================================================================

/// Runs matched to a rule and handed to a worker.
pub static RUNS_DISPATCHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("rup_runs_dispatched_total", "Total runs dispatched to workers"),
        &["rule"],
    )
    .unwrap()
});

/// Runs that matched no rule and went to the backlog.
pub static RUNS_UNMATCHED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "rup_runs_unmatched_total",
        "Total runs that matched no rule",
    )
    .unwrap()
});

/// Run processing duration in seconds.
pub static RUN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "rup_run_duration_seconds",
            "Duration of run processing from dispatch to publication",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
        &["status"], // "completed", "orphaned", "failed"
    )
    .unwrap()
});

// =============================================================================
// Worker Metrics
// =============================================================================

/// Files registered by type.
pub static FILES_REGISTERED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("rup_files_registered_total", "Total file records produced"),
        &["type"], // "raw", "log", "unpacked"
    )
    .unwrap()
});

/// Placement outcomes.
pub static PLACEMENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("rup_placements_total", "Total file placements by outcome"),
        &["outcome"], // "moved", "identical", "replaced", "kept_existing"
    )
    .unwrap()
});

/// Per-file copy or unpack failures.
pub static UNPACK_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "rup_unpack_failures_total",
        "Total data files that failed to copy or unpack",
    )
    .unwrap()
});

/// Unpacking runs that produced no matching output.
pub static UNPACK_EMPTY: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "rup_unpack_empty_total",
        "Total unpacking runs that produced no matching output files",
    )
    .unwrap()
});

/// Image acquisition by result.
pub static IMAGE_PULLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("rup_image_pulls_total", "Total image acquisitions"),
        &["result"], // "cached", "pulled", "failed"
    )
    .unwrap()
});

// =============================================================================
// Publication Metrics
// =============================================================================

/// Publication outcome.
pub static PUBLISH_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("rup_publish_total", "Total publication attempts by outcome"),
        &["result"], // "published", "orphaned", "skipped"
    )
    .unwrap()
});

/// Tracking database lookups that did not find the run yet.
pub static PUBLISH_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "rup_publish_retries_total",
        "Total publication retries while waiting for the run entry",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Dispatch
        Box::new(RUNS_DISPATCHED.clone()),
        Box::new(RUNS_UNMATCHED.clone()),
        Box::new(RUN_DURATION.clone()),
        // Workers
        Box::new(FILES_REGISTERED.clone()),
        Box::new(PLACEMENTS.clone()),
        Box::new(UNPACK_FAILURES.clone()),
        Box::new(UNPACK_EMPTY.clone()),
        Box::new(IMAGE_PULLS.clone()),
        // Publication
        Box::new(PUBLISH_TOTAL.clone()),
        Box::new(PUBLISH_RETRIES.clone()),
    ]
}
