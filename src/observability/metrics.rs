//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): requests by method, status
//! - `relay_request_duration_seconds` (histogram): time until the response head
//! - `relay_streams_active` (gauge): streams holding an upstream connection
//! - `relay_streams_total` (counter): finished streams by outcome
//! - `relay_stream_duration_seconds` (histogram): stream lifetime
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is optional and served on its own address

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::PrometheusBuilder;

/// Installs the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Records an inbound request once its response head is decided.
pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "relay_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("relay_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

/// A stream took ownership of an upstream connection.
pub fn stream_started() {
    metrics::gauge!("relay_streams_active").increment(1.0);
}

/// A stream released its upstream connection.
pub fn stream_released(outcome: &'static str, elapsed: Duration) {
    metrics::gauge!("relay_streams_active").decrement(1.0);
    metrics::counter!("relay_streams_total", "outcome" => outcome).increment(1);
    metrics::histogram!("relay_stream_duration_seconds").record(elapsed.as_secs_f64());
}
