//! Metrics collection and exposition.
//!
//! # Metrics
//! - `throttle_bytes_total` (counter): bytes moved by a pacing loop, by direction
//! - `throttle_ticks_total` (counter): quantum ticks a pacing loop woke for, by direction
//! - `throttle_pacing_exits_total` (counter): pacing loop exits, by direction and outcome
//! - `relay_connections_total` (counter): client connections accepted by the relay
//! - `relay_active_connections` (gauge): relayed connections currently open
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - The Prometheus exporter is optional and owned by the binary

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_bytes(direction: &'static str, bytes: u64) {
    metrics::counter!("throttle_bytes_total", "direction" => direction).increment(bytes);
}

pub fn record_tick(direction: &'static str) {
    metrics::counter!("throttle_ticks_total", "direction" => direction).increment(1);
}

pub fn record_pacing_exit(direction: &'static str, outcome: &'static str) {
    metrics::counter!(
        "throttle_pacing_exits_total",
        "direction" => direction,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_relay_connection() {
    metrics::counter!("relay_connections_total").increment(1);
}

pub fn set_active_connections(count: u64) {
    metrics::gauge!("relay_active_connections").set(count as f64);
}
