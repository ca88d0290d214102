//! Prometheus metrics for the delivery pipeline and background jobs

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter_vec, Histogram, IntCounterVec,
};
use std::time::Duration;

/// Sends by terminal state (committed/compensated/failed)
static SENDS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chat_sends_total",
        "Total send attempts by terminal pipeline state",
        &["state"]
    )
    .expect("failed to register chat_sends_total")
});

/// Inbox fan-out chunks by outcome
static FANOUT_CHUNKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chat_fanout_chunks_total",
        "Inbox fan-out chunks executed, by outcome",
        &["status"]
    )
    .expect("failed to register chat_fanout_chunks_total")
});

/// Archive units (conversation+month) by outcome
static ARCHIVE_UNITS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chat_archive_units_total",
        "Archived conversation/month units by outcome",
        &["status"]
    )
    .expect("failed to register chat_archive_units_total")
});

static ARCHIVE_RUN_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "chat_archive_run_seconds",
        "Duration of archiver ticks",
        vec![0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 600.0]
    )
    .expect("failed to register chat_archive_run_seconds")
});

/// Fire-and-forget tasks that ended in an error
static BACKGROUND_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chat_background_failures_total",
        "Failed fire-and-forget background tasks by label",
        &["task"]
    )
    .expect("failed to register chat_background_failures_total")
});

pub fn record_send(state: &str) {
    SENDS_TOTAL.with_label_values(&[state]).inc();
}

pub fn record_fanout_chunk(status: &str) {
    FANOUT_CHUNKS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_archive_unit(status: &str) {
    ARCHIVE_UNITS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_archive_run_duration(duration: Duration) {
    ARCHIVE_RUN_SECONDS.observe(duration.as_secs_f64());
}

pub fn record_background_failure(task: &str) {
    BACKGROUND_FAILURES_TOTAL.with_label_values(&[task]).inc();
}
