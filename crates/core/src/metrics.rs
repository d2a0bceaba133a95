//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Job lifecycle (started, finished, running)
//! - Record outcomes
//! - Persistence queue flushes and telemetry delivery
//! - Authentication attempts

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Jobs
// =============================================================================

/// Jobs started by job name.
pub static JOBS_STARTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("docket_jobs_started_total", "Total jobs started"),
        &["job"],
    )
    .unwrap()
});

/// Jobs finished by job name and result.
pub static JOBS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("docket_jobs_finished_total", "Total jobs finished"),
        &["job", "result"], // "completed", "cancelled", "aborted"
    )
    .unwrap()
});

/// Jobs currently between setup and finalize.
pub static JOBS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("docket_jobs_running", "Number of jobs currently running").unwrap()
});

/// Wall-clock duration of a job.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("docket_job_duration_seconds", "Duration of a job run")
            .buckets(vec![1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0]),
        &["job"],
    )
    .unwrap()
});

// =============================================================================
// Records
// =============================================================================

/// Records processed by outcome.
pub static RECORDS_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("docket_records_processed_total", "Total records processed"),
        &["outcome"], // "succeeded", "failed"
    )
    .unwrap()
});

// =============================================================================
// Queues
// =============================================================================

/// Persistence queue flushes by queue and result.
pub static QUEUE_FLUSHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "docket_queue_flushes_total",
            "Total persistence queue flushes",
        ),
        &["queue", "result"],
    )
    .unwrap()
});

/// Telemetry events that could not be delivered to the progress channel.
pub static TELEMETRY_DELIVERY_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "docket_telemetry_delivery_failures_total",
            "Telemetry events dropped after a failed delivery",
        ),
        &["reason"], // "connect", "stale_binding", "transport"
    )
    .unwrap()
});

// =============================================================================
// Authentication
// =============================================================================

/// Authentication attempts by method and result.
pub static AUTH_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("docket_auth_attempts_total", "Total authentication attempts"),
        &["method", "result"], // method: "password", "certificate"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(JOBS_STARTED.clone()),
        Box::new(JOBS_FINISHED.clone()),
        Box::new(JOBS_RUNNING.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(RECORDS_PROCESSED.clone()),
        Box::new(QUEUE_FLUSHES_TOTAL.clone()),
        Box::new(TELEMETRY_DELIVERY_FAILURES.clone()),
        Box::new(AUTH_ATTEMPTS.clone()),
    ]
}
