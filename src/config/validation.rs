//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacities > 0, factors in range, ordered bounds)
//! - Check addresses and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: HubConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::HubConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &HubConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be > 0"));
    }

    let t = &config.telemetry;
    if t.log_capacity == 0 {
        errors.push(ValidationError::new("telemetry.log_capacity", "must be > 0"));
    }
    if t.metric_capacity_per_service == 0 {
        errors.push(ValidationError::new("telemetry.metric_capacity_per_service", "must be > 0"));
    }
    if t.metric_history_capacity == 0 {
        errors.push(ValidationError::new("telemetry.metric_history_capacity", "must be > 0"));
    }
    if t.max_pending_calls == 0 {
        errors.push(ValidationError::new("telemetry.max_pending_calls", "must be > 0"));
    }
    if t.file_prefix.is_empty() || t.file_prefix.contains(['/', '\\']) {
        errors.push(ValidationError::new(
            "telemetry.file_prefix",
            "must be a non-empty file name",
        ));
    }

    let r = &config.relays;
    for (field, value) in [
        ("relays.logs_buffer", r.logs_buffer),
        ("relays.metrics_buffer", r.metrics_buffer),
        ("relays.performance_buffer", r.performance_buffer),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be > 0"));
        }
    }

    let s = &config.statistics;
    if !(s.smoothing_factor > 0.0 && s.smoothing_factor < 1.0) {
        errors.push(ValidationError::new(
            "statistics.smoothing_factor",
            format!("{} is outside (0, 1)", s.smoothing_factor),
        ));
    }
    if s.max_samples == 0 {
        errors.push(ValidationError::new("statistics.max_samples", "must be > 0"));
    }
    if s.refresh_interval_secs == 0 {
        errors.push(ValidationError::new("statistics.refresh_interval_secs", "must be > 0"));
    }
    if !(0.0..=100.0).contains(&s.flagged_threshold_percent) {
        errors.push(ValidationError::new(
            "statistics.flagged_threshold_percent",
            "must be within [0, 100]",
        ));
    }

    let c = &config.connectivity;
    if c.enabled {
        if url::Url::parse(&c.url).is_err() {
            errors.push(ValidationError::new(
                "connectivity.url",
                format!("'{}' is not a valid URL", c.url),
            ));
        }
        if c.channels.is_empty() {
            errors.push(ValidationError::new("connectivity.channels", "at least one channel required"));
        }
    }
    if c.base_delay_ms == 0 || c.base_delay_ms > c.max_delay_ms {
        errors.push(ValidationError::new(
            "connectivity.base_delay_ms",
            "must be > 0 and <= max_delay_ms",
        ));
    }
    if c.backoff_factor < 1.0 {
        errors.push(ValidationError::new("connectivity.backoff_factor", "must be >= 1.0"));
    }
    if c.max_attempts == 0 {
        errors.push(ValidationError::new("connectivity.max_attempts", "must be > 0"));
    }
    if c.ping_interval_secs == 0 {
        errors.push(ValidationError::new("connectivity.ping_interval_secs", "must be > 0"));
    }
    if c.manual_attempts == 0 {
        errors.push(ValidationError::new("connectivity.manual_attempts", "must be > 0"));
    }

    let h = &config.health;
    if h.enabled && url::Url::parse(&h.url).is_err() {
        errors.push(ValidationError::new(
            "health.url",
            format!("'{}' is not a valid URL", h.url),
        ));
    }
    if h.min_interval_secs == 0 || h.min_interval_secs > h.max_interval_secs {
        errors.push(ValidationError::new(
            "health.min_interval_secs",
            "must be > 0 and <= max_interval_secs",
        ));
    }
    if h.growth_factor < 1.0 {
        errors.push(ValidationError::new("health.growth_factor", "must be >= 1.0"));
    }
    if h.healthy_below_ms >= h.degraded_below_ms {
        errors.push(ValidationError::new(
            "health.healthy_below_ms",
            "must be < degraded_below_ms",
        ));
    }
    if h.sample_window == 0 {
        errors.push(ValidationError::new("health.sample_window", "must be > 0"));
    }

    let o = &config.observability;
    if o.metrics_enabled && o.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", o.metrics_address),
        ));
    }

    let sim = &config.simulation;
    if sim.min_interval_ms == 0 || sim.min_interval_ms > sim.max_interval_ms {
        errors.push(ValidationError::new(
            "simulation.min_interval_ms",
            "must be > 0 and <= max_interval_ms",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
