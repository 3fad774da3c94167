//! Metrics collection and exposition.
//!
//! # Metrics
//! - `service_idempotency_requests_total` (counter): coordinator outcome by `outcome`
//! - `service_ttl_store_evictions_total` (counter): evictions by `reason`
//! - `service_ttl_store_entries` (gauge): entries after the last sweep
//! - `service_rate_limited_total` (counter): rejected requests by `reason`
//! - `service_lifecycle_transitions_total` (counter): controller transitions by `state`
//! - `service_active_connections` (gauge): open client connections
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is optional and bound to its own address

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_idempotency(outcome: &'static str) {
    ::metrics::counter!("service_idempotency_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_store_eviction(reason: &'static str, count: u64) {
    ::metrics::counter!("service_ttl_store_evictions_total", "reason" => reason).increment(count);
}

pub fn record_store_size(size: usize) {
    ::metrics::gauge!("service_ttl_store_entries").set(size as f64);
}

pub fn record_rate_limited(reason: &'static str) {
    ::metrics::counter!("service_rate_limited_total", "reason" => reason).increment(1);
}

pub fn record_lifecycle(state: &'static str) {
    ::metrics::counter!("service_lifecycle_transitions_total", "state" => state).increment(1);
}

pub fn record_active_connections(count: u64) {
    ::metrics::gauge!("service_active_connections").set(count as f64);
}
