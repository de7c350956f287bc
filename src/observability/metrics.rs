//! Metrics collection and exposition.
//!
//! # Metrics
//! - `h2c_requests_total` (counter): requests by method, status, route
//! - `h2c_request_duration_seconds` (histogram): handler latency incl. delay
//!
//! # Design Decisions
//! - The `metrics` facade is a no-op until a recorder is installed, so
//!   handlers record unconditionally
//! - Prometheus endpoint only when `observability.metrics_enabled`

use std::net::{AddrParseError, SocketAddr};
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const REQUESTS_TOTAL: &str = "h2c_requests_total";
pub const REQUEST_DURATION: &str = "h2c_request_duration_seconds";

/// Failure to bring up the metrics endpoint.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("invalid metrics address: {0}")]
    Address(#[from] AddrParseError),
    #[error("failed to install Prometheus recorder: {0}")]
    Install(#[from] BuildError),
}

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(address: &str) -> Result<(), MetricsError> {
    let addr: SocketAddr = address.parse()?;
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one handled request.
pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("route", route.to_string()),
    ];
    metrics::counter!(REQUESTS_TOTAL, &labels).increment(1);
    metrics::histogram!(REQUEST_DURATION, &labels).record(start.elapsed().as_secs_f64());
}
