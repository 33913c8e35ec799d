//! Metrics module
//!
//! Prometheus counters and histograms for transfers, exposed by
//! [`server::MetricsServer`] when enabled.

pub mod server;

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter_vec, CounterVec,
    HistogramVec, IntCounterVec,
};

lazy_static! {
    pub static ref TRANSFERS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "gcs_file_api_transfers_total",
        "Storage operations by outcome",
        &["operation", "outcome"]
    ).unwrap();

    pub static ref BYTES_TOTAL: CounterVec = register_counter_vec!(
        "gcs_file_api_bytes_total",
        "Bytes moved to or from the bucket",
        &["direction"]  // "upload" or "download"
    ).unwrap();

    pub static ref POLICY_VIOLATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "gcs_file_api_policy_violations_total",
        "Uploads rejected by policy",
        &["reason"]  // "size" or "type"
    ).unwrap();

    pub static ref BACKEND_DURATION: HistogramVec = register_histogram_vec!(
        "gcs_file_api_backend_duration_seconds",
        "Storage backend call duration in seconds",
        &["operation"],
        vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    ).unwrap();

    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "gcs_file_api_http_requests_total",
        "HTTP requests by route and status code",
        &["route", "status"]
    ).unwrap();
}

/// Record the outcome of a storage operation
pub fn record_transfer(operation: &str, outcome: &str) {
    TRANSFERS_TOTAL.with_label_values(&[operation, outcome]).inc();
}

/// Record bytes moved in one direction
pub fn record_bytes(direction: &str, bytes: u64) {
    BYTES_TOTAL.with_label_values(&[direction]).inc_by(bytes as f64);
}

/// Record an upload rejected by policy
pub fn record_policy_violation(reason: &str) {
    POLICY_VIOLATIONS_TOTAL.with_label_values(&[reason]).inc();
}

/// Record how long a backend call took
pub fn record_backend_duration(operation: &str, duration_secs: f64) {
    BACKEND_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}

/// Record a served HTTP request
pub fn record_http_request(route: &str, status: u16) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[route, &status.to_string()])
        .inc();
}
