//! Metrics collection and exposition.
//!
//! # Metrics
//! - `routekit_requests_total` (counter): requests by method, status, route type
//! - `routekit_request_duration_seconds` (histogram): dispatch latency
//! - `routekit_static_index_files` (gauge): files in the current index generation
//! - `routekit_static_index_rebuilds_total` (counter): completed rebuilds
//! - `routekit_static_index_rebuild_seconds` (histogram): rebuild duration

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Route type label for requests no matcher accepted.
pub const UNMATCHED: &str = "none";

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one dispatched request.
pub fn record_request(method: &str, status: u16, route_type: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("route_type", route_type.to_string()),
    ];
    counter!("routekit_requests_total", &labels).increment(1);
    histogram!("routekit_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

/// Record a completed static index rebuild.
pub fn record_index_rebuild(files: usize, started: Instant) {
    gauge!("routekit_static_index_files").set(files as f64);
    counter!("routekit_static_index_rebuilds_total").increment(1);
    histogram!("routekit_static_index_rebuild_seconds").record(started.elapsed().as_secs_f64());
}
