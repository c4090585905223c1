//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (RPS, latency, rejections, retries, breaker state)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, method, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): denials by key type
//! - `gateway_backend_retries_total` (counter): retry attempts by backend
//! - `gateway_circuit_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `gateway_filter_faults_total` (counter): filter faults by filter name
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Labels for route, backend, status code
//! - Histogram buckets tuned for typical web latencies

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

use crate::resilience::circuit_breaker::CircuitState;

const LATENCY_BUCKETS: [f64; 12] = [
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    let builder = match builder.set_buckets_for_metric(
        Matcher::Full("gateway_request_duration_seconds".to_string()),
        &LATENCY_BUCKETS,
    ) {
        Ok(builder) => builder,
        Err(e) => {
            tracing::error!(error = %e, "Invalid histogram buckets");
            return;
        }
    };

    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus exporter"),
    }
}

/// Record one completed client request.
pub fn record_request(route: &str, method: &str, status: u16, start: Instant) {
    let labels = [
        ("route", route.to_string()),
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("gateway_requests_total", &labels).increment(1);
    metrics::histogram!("gateway_request_duration_seconds", &labels[..2])
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(key_type: &str) {
    metrics::counter!("gateway_rate_limited_total", "key_type" => key_type.to_string()).increment(1);
}

pub fn record_retry(backend: &str) {
    metrics::counter!("gateway_backend_retries_total", "backend" => backend.to_string()).increment(1);
}

pub fn record_circuit_state(backend: &str, state: CircuitState) {
    metrics::gauge!("gateway_circuit_state", "backend" => backend.to_string()).set(state.as_gauge());
}

pub fn record_filter_fault(filter: &str) {
    metrics::counter!("gateway_filter_faults_total", "filter" => filter.to_string()).increment(1);
}
