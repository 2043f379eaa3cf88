//! Prometheus metrics for the identification service.

use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};

/// Metric name prefix for all Reelsong metrics.
const PREFIX: &str = "reelsong";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Submission metrics
    pub static ref SUBMISSIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            format!("{PREFIX}_submissions_total"),
            "Total identification submissions"
        ),
        &["result"]
    ).expect("Failed to create submissions_total metric");

    // Pipeline metrics
    pub static ref PIPELINE_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            format!("{PREFIX}_pipeline_runs_total"),
            "Pipeline attempts by outcome"
        ),
        &["outcome"]
    ).expect("Failed to create pipeline_runs_total metric");

    pub static ref RETRIES_SCHEDULED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_retries_scheduled_total"),
        "Tasks promoted from retry-waiting back onto the run queue"
    ).expect("Failed to create retries_scheduled_total metric");
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; re-registration is ignored.
pub fn init_metrics() {
    let _ = REGISTRY.register(Box::new(SUBMISSIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PIPELINE_RUNS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(RETRIES_SCHEDULED_TOTAL.clone()));
}

/// Count a submission by its result: "cached", "queued" or "rejected".
pub fn record_submission(result: &str) {
    SUBMISSIONS_TOTAL.with_label_values(&[result]).inc();
}

/// Count a pipeline attempt by its outcome label.
pub fn record_pipeline_outcome(outcome: &str) {
    PIPELINE_RUNS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_retry_scheduled() {
    RETRIES_SCHEDULED_TOTAL.inc();
}

/// Handler serving the metrics in Prometheus text format.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (StatusCode::OK, buffer).into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
