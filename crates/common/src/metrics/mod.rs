//! Metrics and observability utilities
//!
//! Metric names share the `robodigest` prefix. Recording goes through
//! the `metrics` facade; the gateway binary installs the Prometheus
//! exporter, other processes record into the no-op default.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all RoboDigest metrics
pub const METRICS_PREFIX: &str = "robodigest";

/// Buckets for HTTP edge latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000,
];

/// Buckets for fetch pass duration; a pass can take many minutes
pub const FETCH_BUCKETS: &[f64] = &[
    1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0,
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    describe_counter!(
        format!("{}_records_total", METRICS_PREFIX),
        Unit::Count,
        "Records handled by fetch passes, by kind and outcome"
    );

    describe_counter!(
        format!("{}_fetch_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Completed fetch passes by terminal status"
    );

    describe_histogram!(
        format!("{}_fetch_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Wall time of one fetch pass"
    );

    describe_counter!(
        format!("{}_upstream_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Requests sent to upstream providers"
    );

    describe_counter!(
        format!("{}_enrichment_total", METRICS_PREFIX),
        Unit::Count,
        "Supplement lookups by outcome"
    );

    describe_gauge!(
        format!("{}_fetch_running", METRICS_PREFIX),
        Unit::Count,
        "1 while a fetch pass holds the progress slot"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Count one stored, updated or skipped record
pub fn record_outcome(kind: &str, outcome: &str) {
    counter!(
        format!("{}_records_total", METRICS_PREFIX),
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Mark the start of a pass
pub fn record_run_started(kind: &str) {
    gauge!(
        format!("{}_fetch_running", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .set(1.0);
}

/// Record a finished pass and its duration
pub fn record_run(kind: &str, status: &str, duration_secs: f64) {
    counter!(
        format!("{}_fetch_runs_total", METRICS_PREFIX),
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_fetch_duration_seconds", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .record(duration_secs);

    gauge!(
        format!("{}_fetch_running", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .set(0.0);
}

/// Count one upstream call by provider and HTTP status (or `error`)
pub fn record_upstream(source: &str, status: &str) {
    counter!(
        format!("{}_upstream_requests_total", METRICS_PREFIX),
        "source" => source.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_enrichment(outcome: &str) {
    counter!(
        format!("{}_enrichment_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}
