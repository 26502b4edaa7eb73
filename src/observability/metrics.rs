//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define relay metrics (sessions, latency, bytes, backpressure)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `relay_sessions_total` (counter): finished sessions by outcome
//! - `relay_session_duration_seconds` (histogram): session lifetime
//! - `relay_bytes_total` (counter): body bytes forwarded to clients
//! - `relay_active_sessions` (gauge): sessions currently running
//! - `relay_backpressure_pauses_total` (counter): origin reads paused for a slow client
//!
//! # Design Decisions
//! - Low-overhead metric updates through the `metrics` facade; without an
//!   installed recorder every call is a no-op
//! - The only label is the session outcome, keeping cardinality fixed

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::relay::error::Outcome;

/// Install the Prometheus recorder and its HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_session(outcome: Outcome, duration: Duration, bytes: u64) {
    counter!("relay_sessions_total", "outcome" => outcome.as_str()).increment(1);
    histogram!("relay_session_duration_seconds").record(duration.as_secs_f64());
    counter!("relay_bytes_total").increment(bytes);
}

pub fn record_backpressure_pause() {
    counter!("relay_backpressure_pauses_total").increment(1);
}

pub fn set_active_sessions(count: u64) {
    gauge!("relay_active_sessions").set(count as f64);
}
