//! Metrics collection and exposition.
//!
//! # Metrics
//! - `balancer_requests_total` (counter): balanced requests by outcome
//! - `balancer_rate_limited_total` (counter): admissions denied by the token bucket
//! - `balancer_no_server_total` (counter): round-robin slots found busy
//! - `balancer_refills_total` (counter): refill ticks
//! - `balancer_users` (gauge): registered users

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus exporter on `addr`. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(outcome: &'static str) {
    counter!("balancer_requests_total", "outcome" => outcome).increment(1);
    match outcome {
        "rate_limited" => counter!("balancer_rate_limited_total").increment(1),
        "no_server" => counter!("balancer_no_server_total").increment(1),
        _ => {}
    }
}

pub fn record_refill(users: usize) {
    counter!("balancer_refills_total").increment(1);
    gauge!("balancer_users").set(users as f64);
}

pub fn record_user_count(users: usize) {
    gauge!("balancer_users").set(users as f64);
}
