//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define hub metrics (log volume, call latency, relay output, connectivity)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-service and per-channel metrics
//!
//! # Metrics
//! - `hub_log_records_total` (counter): records appended, by level
//! - `hub_service_calls_total` (counter): finalized calls, by service and outcome
//! - `hub_service_call_duration_seconds` (histogram): call latency, by service
//! - `hub_relay_emissions_total` (counter): relayed batches, by relay
//! - `hub_relay_items_total` (counter): relayed items, by relay
//! - `hub_channel_connected` (gauge): 1=connected, 0=not, by channel
//! - `hub_channel_reconnect_attempts_total` (counter): by channel
//! - `hub_health_checks_total` (counter): supervisor probes, by status
//! - `hub_health_response_seconds` (histogram): probe latency
//! - `hub_http_requests_total` (counter): admin surface requests
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library users and
//!   tests pay nothing
//! - Labels stay low-cardinality (service, channel, relay, level)

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::telemetry::LogLevel;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe_metrics();
            tracing::info!(address = %addr, "Prometheus metrics exporter started");
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install Prometheus recorder");
        }
    }
}

fn describe_metrics() {
    describe_counter!("hub_log_records_total", "Log records appended to the store");
    describe_counter!("hub_service_calls_total", "Finalized service calls");
    describe_histogram!(
        "hub_service_call_duration_seconds",
        "Duration of finalized service calls"
    );
    describe_counter!("hub_relay_emissions_total", "Batches emitted by relays");
    describe_counter!("hub_relay_items_total", "Items emitted by relays");
    describe_gauge!("hub_channel_connected", "Whether a transport channel is connected");
    describe_counter!(
        "hub_channel_reconnect_attempts_total",
        "Automatic reconnect attempts per channel"
    );
    describe_counter!("hub_health_checks_total", "Health supervisor probes by outcome");
    describe_histogram!("hub_health_response_seconds", "Health probe response time");
    describe_counter!("hub_http_requests_total", "Requests served by the admin surface");
}

pub fn record_log(level: LogLevel) {
    counter!("hub_log_records_total", "level" => level.as_str()).increment(1);
}

pub fn record_service_call(service: &str, status: Option<u16>, duration_ms: Option<f64>) {
    let outcome = match status {
        Some(s) if (200..400).contains(&s) => "success",
        Some(_) => "error",
        None => "unknown",
    };
    counter!(
        "hub_service_calls_total",
        "service" => service.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    if let Some(ms) = duration_ms {
        histogram!("hub_service_call_duration_seconds", "service" => service.to_string())
            .record(ms / 1000.0);
    }
}

pub fn record_relay_emission(relay: &'static str, items: usize) {
    counter!("hub_relay_emissions_total", "relay" => relay).increment(1);
    counter!("hub_relay_items_total", "relay" => relay).increment(items as u64);
}

pub fn record_channel_connected(channel: &str, connected: bool) {
    gauge!("hub_channel_connected", "channel" => channel_label(channel))
        .set(if connected { 1.0 } else { 0.0 });
}

pub fn record_reconnect_attempt(channel: &str) {
    counter!("hub_channel_reconnect_attempts_total", "channel" => channel_label(channel))
        .increment(1);
}

pub fn record_health_check(status: &'static str, response_time: Option<Duration>) {
    counter!("hub_health_checks_total", "status" => status).increment(1);
    if let Some(rt) = response_time {
        histogram!("hub_health_response_seconds").record(rt.as_secs_f64());
    }
}

pub fn record_http_request(method: &str, status: u16, start: Instant) {
    counter!(
        "hub_http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("hub_http_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

fn channel_label(channel: &str) -> String {
    if channel.is_empty() {
        "default".to_string()
    } else {
        channel.to_string()
    }
}
