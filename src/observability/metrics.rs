//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_requests_rate_limited_total` (counter): requests rejected with 429
//! - `guard_requests_rejected_input_total` (counter): requests rejected with 400
//! - `guard_uploads_rejected_total` (counter): uploads rejected, by reason
//! - `guard_uploads_accepted_total` (counter): uploads that passed validation
//!
//! Recording is a no-op until a recorder is installed, so tests and
//! metrics-disabled deployments pay nothing.

use std::net::SocketAddr;

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_rate_limited() {
    counter!("guard_requests_rate_limited_total").increment(1);
}

pub fn record_rejected_input(source: &'static str) {
    counter!("guard_requests_rejected_input_total", "source" => source).increment(1);
}

pub fn record_upload_rejected(reason: &'static str) {
    counter!("guard_uploads_rejected_total", "reason" => reason).increment(1);
}

pub fn record_upload_accepted() {
    counter!("guard_uploads_accepted_total").increment(1);
}
