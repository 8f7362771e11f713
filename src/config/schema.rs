//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the hub.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the telemetry hub.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HubConfig {
    /// HTTP surface (admin API, health endpoint, live streams).
    pub server: ServerConfig,

    /// In-memory buffers and the daily file sink.
    pub telemetry: TelemetryConfig,

    /// Relay cadences and buffer sizes.
    pub relays: RelayConfig,

    /// Derived statistics and KPI settings.
    pub statistics: StatisticsConfig,

    /// Live transport channels.
    pub connectivity: ConnectivityConfig,

    /// Remote health polling.
    pub health: HealthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Synthetic statistics for demo mode.
    pub simulation: SimulationConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Request timeout in seconds. Does not apply to upgraded WebSockets.
    pub request_timeout_secs: u64,

    /// Version string reported by `/health`.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            request_timeout_secs: 30,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Telemetry store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Maximum log records kept in memory.
    pub log_capacity: usize,

    /// Maximum finalized calls kept per service.
    pub metric_capacity_per_service: usize,

    /// Maximum finalized calls kept across all services.
    pub metric_history_capacity: usize,

    /// Maximum in-flight calls tracked; the oldest is dropped when full.
    pub max_pending_calls: usize,

    /// Directory for the daily log file. `None` disables the file sink.
    pub log_dir: Option<String>,

    /// File name prefix (`<prefix>-YYYY-MM-DD.log`).
    pub file_prefix: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_capacity: 1000,
            metric_capacity_per_service: 200,
            metric_history_capacity: 200,
            max_pending_calls: 1000,
            log_dir: Some("logs".to_string()),
            file_prefix: "app".to_string(),
        }
    }
}

/// Relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Quiet period for the log relay in milliseconds.
    pub logs_quiet_ms: u64,

    /// Records kept by the log relay.
    pub logs_buffer: usize,

    /// Quiet period for the service metrics relay in milliseconds.
    pub metrics_quiet_ms: u64,

    /// Records kept by the service metrics relay.
    pub metrics_buffer: usize,

    /// Quiet period for the performance window relay in milliseconds.
    pub performance_quiet_ms: u64,

    /// Records kept by the performance window relay.
    pub performance_buffer: usize,

    /// Quiet period for the hero KPI relay in milliseconds.
    pub hero_quiet_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            logs_quiet_ms: 500,
            logs_buffer: 500,
            metrics_quiet_ms: 2000,
            metrics_buffer: 120,
            performance_quiet_ms: 1200,
            performance_buffer: 200,
            hero_quiet_ms: 2500,
        }
    }
}

/// Derived statistics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Only metrics newer than this are used for per-service statistics.
    pub lookback_secs: u64,

    /// Sample cap for per-service statistics.
    pub max_samples: usize,

    /// EMA smoothing factor, in (0, 1).
    pub smoothing_factor: f64,

    /// Periodic refresh of every service's statistics.
    pub refresh_interval_secs: u64,

    /// Sample cap for the periodic refresh.
    pub poll_samples: usize,

    /// Sample count for hero latency figures.
    pub hero_window: usize,

    /// Success rates below this count as flagged.
    pub flagged_threshold_percent: f64,

    /// Size of the flattened performance window.
    pub performance_window: usize,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            lookback_secs: 30,
            max_samples: 10,
            smoothing_factor: 0.3,
            refresh_interval_secs: 15,
            poll_samples: 50,
            hero_window: 50,
            flagged_threshold_percent: 85.0,
            performance_window: 200,
        }
    }
}

/// Connectivity manager configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Enable live transport channels.
    pub enabled: bool,

    /// Base WebSocket URL; channel names are appended as a path segment.
    pub url: String,

    /// Channels to open at start-up. The empty string is the default channel.
    pub channels: Vec<String>,

    /// First reconnect delay in milliseconds.
    pub base_delay_ms: u64,

    /// Upper bound for reconnect delays in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor between reconnect delays.
    pub backoff_factor: f64,

    /// Automatic attempts before the channel is marked failed.
    pub max_attempts: u32,

    /// Latency probe interval in seconds.
    pub ping_interval_secs: u64,

    /// Dial timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Wait between teardown and redial on manual reconnect.
    pub manual_grace_ms: u64,

    /// Timeout for each manual reconnect try.
    pub manual_timeout_ms: u64,

    /// Tries per manual reconnect before the caller gets an error.
    pub manual_attempts: u32,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "ws://127.0.0.1:3000/ws".to_string(),
            channels: vec![String::new()],
            base_delay_ms: 2000,
            max_delay_ms: 30_000,
            backoff_factor: 1.5,
            max_attempts: 10,
            ping_interval_secs: 30,
            connect_timeout_ms: 20_000,
            manual_grace_ms: 1000,
            manual_timeout_ms: 5000,
            manual_attempts: 3,
        }
    }
}

/// Health supervisor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Enable remote health polling.
    pub enabled: bool,

    /// Endpoint returning `{status, uptimeSeconds, version}`.
    pub url: String,

    /// Poll interval after a success, in seconds.
    pub min_interval_secs: u64,

    /// Upper bound for the poll interval, in seconds.
    pub max_interval_secs: u64,

    /// Interval growth factor after a failure.
    pub growth_factor: f64,

    /// Probe timeout in seconds.
    pub timeout_secs: u64,

    /// Below this response time the endpoint is healthy.
    pub healthy_below_ms: u64,

    /// Below this response time the endpoint is degraded; above, unavailable.
    pub degraded_below_ms: u64,

    /// Failures logged before logging is suppressed.
    pub max_logged_failures: u32,

    /// Response times retained.
    pub sample_window: usize,

    /// Delay before the first probe, in seconds.
    pub initial_delay_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "http://127.0.0.1:3000/health".to_string(),
            min_interval_secs: 60,
            max_interval_secs: 300,
            growth_factor: 1.5,
            timeout_secs: 10,
            healthy_below_ms: 300,
            degraded_below_ms: 1000,
            max_logged_failures: 5,
            sample_window: 5,
            initial_delay_secs: 1,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Simulated statistics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Start in simulation mode.
    pub enabled: bool,

    /// Lower bound between synthetic updates, in milliseconds.
    pub min_interval_ms: u64,

    /// Upper bound between synthetic updates, in milliseconds.
    pub max_interval_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_interval_ms: 8000,
            max_interval_ms: 12_000,
        }
    }
}
