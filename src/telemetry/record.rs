//! Telemetry record types.
//!
//! Records are immutable once they leave the store. Every record carries a
//! store-assigned `seq` that is strictly increasing per stream; relays use it
//! as the dedup watermark.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" | "log" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// A single log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Store-assigned sequence number (0 until appended).
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogRecord {
    /// Create an unsequenced record stamped with the current time.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            seq: 0,
            timestamp: Utc::now(),
            level,
            message: message.into(),
            component: None,
            details: None,
        }
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Counters attached to every finalized call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedCounters {
    pub security_events: u32,
    pub auth_attempts: u32,
    pub failed_auths: u32,
    pub active_users: u32,
    pub average_latency: f64,
    pub error_rate_percent: f64,
}

impl DerivedCounters {
    /// Counters for a single finished call.
    pub fn for_call(duration_ms: f64, status_code: Option<u16>) -> Self {
        let failed = status_code.map(|s| s >= 400).unwrap_or(false);
        Self {
            average_latency: duration_ms,
            error_rate_percent: if failed { 100.0 } else { 0.0 },
            ..Self::default()
        }
    }
}

/// A finalized service call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCallMetric {
    pub seq: u64,
    pub id: String,
    pub service_name: String,
    pub method: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub counters: DerivedCounters,
}

impl ServiceCallMetric {
    /// Status in the `[200, 400)` range.
    pub fn is_success(&self) -> Option<bool> {
        self.status_code.map(|s| (200..400).contains(&s))
    }

    pub fn is_error(&self) -> bool {
        self.status_code.map(|s| s >= 400).unwrap_or(false)
    }
}

/// A call that has started but not finished yet.
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub id: String,
    pub service_name: String,
    pub method: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub started: Instant,
}

impl PendingCall {
    /// Finalize into an immutable metric.
    pub fn finish(self, status_code: Option<u16>) -> ServiceCallMetric {
        let duration_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        ServiceCallMetric {
            seq: 0,
            id: self.id,
            service_name: self.service_name,
            method: self.method,
            url: self.url,
            timestamp: self.timestamp,
            duration_ms: Some(duration_ms),
            status_code,
            counters: DerivedCounters::for_call(duration_ms, status_code),
        }
    }
}

/// Anything carrying a store sequence number.
pub trait Sequenced {
    fn seq(&self) -> u64;
}

impl Sequenced for LogRecord {
    fn seq(&self) -> u64 {
        self.seq
    }
}

impl Sequenced for ServiceCallMetric {
    fn seq(&self) -> u64 {
        self.seq
    }
}

impl<T: Sequenced> Sequenced for std::sync::Arc<T> {
    fn seq(&self) -> u64 {
        (**self).seq()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("log".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_counters_for_failed_call() {
        let counters = DerivedCounters::for_call(42.0, Some(503));
        assert_eq!(counters.error_rate_percent, 100.0);
        assert_eq!(counters.average_latency, 42.0);

        let ok = DerivedCounters::for_call(10.0, Some(204));
        assert_eq!(ok.error_rate_percent, 0.0);
    }

    #[test]
    fn test_log_record_serializes_lowercase_level() {
        let record = LogRecord::new(LogLevel::Error, "boom").with_component("api");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["level"], "error");
        assert_eq!(json["component"], "api");
        assert!(json.get("details").is_none());
    }
}
