//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define admission metrics (admitted, rejected, latency, limiter size)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gateway_requests_admitted_total` (counter): requests that cleared every stage
//! - `gateway_requests_rejected_total` (counter): rejections by `stage`, `code`
//! - `gateway_admission_duration_seconds` (histogram): time spent in the pipeline
//! - `gateway_rate_limit_entries` (gauge): tracked keys per `limiter`
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests need no setup
//! - Labels are static strings; client-controlled values never become labels

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_admitted(started: Instant) {
    counter!("gateway_requests_admitted_total").increment(1);
    histogram!("gateway_admission_duration_seconds", "outcome" => "admitted")
        .record(started.elapsed().as_secs_f64());
}

pub fn record_rejected(stage: &'static str, code: &'static str, started: Instant) {
    counter!("gateway_requests_rejected_total", "stage" => stage, "code" => code).increment(1);
    histogram!("gateway_admission_duration_seconds", "outcome" => "rejected")
        .record(started.elapsed().as_secs_f64());
}

pub fn record_rate_limit_entries(limiter: &'static str, entries: usize) {
    gauge!("gateway_rate_limit_entries", "limiter" => limiter).set(entries as f64);
}
