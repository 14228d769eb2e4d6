//! Metrics collection and exposition.
//!
//! # Metrics
//! - `shed_requests_shed_total` (counter): requests rejected for lack of
//!   budget, by reason
//! - `shed_query_cancellations_total` (counter): queries cancelled on
//!   deadline, by outcome
//! - `shed_prepared_statement_retries_total` (counter): stale plan
//!   handling, by outcome
//! - `shed_http_requests_total` (counter): requests by method, status
//! - `shed_http_request_duration_seconds` (histogram): latency distribution
//!
//! # Design Decisions
//! - Recording without an installed exporter is a no-op, so library users
//!   pay nothing unless they opt in

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// A request was shed. `reason` is `expired_on_arrival` or `deadline_exceeded`.
pub fn record_shed(reason: &'static str) {
    metrics::counter!("shed_requests_shed_total", "reason" => reason).increment(1);
}

/// A query hit its deadline and was cancelled.
pub fn record_query_cancellation(outcome: &'static str) {
    metrics::counter!("shed_query_cancellations_total", "outcome" => outcome).increment(1);
}

/// A prepared statement's cached plan expired.
pub fn record_prepared_statement_retry(outcome: &'static str) {
    metrics::counter!("shed_prepared_statement_retries_total", "outcome" => outcome).increment(1);
}

/// A request finished.
pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "shed_http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("shed_http_request_duration_seconds").record(start.elapsed().as_secs_f64());
}
