//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_hop_duration_seconds` (histogram): per-stage latency, labelled by `stage`
//! - `relay_requests_total` (counter): relayed requests by `outcome`
//! - `relay_request_duration_seconds` (histogram): end-to-end MRT
//! - `relay_backend_available` (gauge): 1=available, 0=unavailable, by `group` and `backend`
//! - `service_requests_total` (counter): handled frames by `status`

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::load_balancer::Backend;
use crate::relay::timing::Stage;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics recorder"),
    }
}

pub fn record_hop(stage: Stage, elapsed: Duration) {
    metrics::histogram!("relay_hop_duration_seconds", "stage" => stage.key())
        .record(elapsed.as_secs_f64());
}

/// Count one relayed request. `mrt` is only known for completed requests.
pub fn record_request(outcome: &'static str, mrt: Option<Duration>) {
    metrics::counter!("relay_requests_total", "outcome" => outcome).increment(1);
    if let Some(mrt) = mrt {
        metrics::histogram!("relay_request_duration_seconds").record(mrt.as_secs_f64());
    }
}

pub fn record_backend_available(group: &str, backend: &Backend, available: bool) {
    metrics::gauge!(
        "relay_backend_available",
        "group" => group.to_string(),
        "backend" => backend.to_string()
    )
    .set(if available { 1.0 } else { 0.0 });
}

pub fn record_service_request(status: &'static str) {
    metrics::counter!("service_requests_total", "status" => status).increment(1);
}
