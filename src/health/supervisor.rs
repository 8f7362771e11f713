//! Adaptive status polling.
//!
//! # Responsibilities
//! - Poll the remote status endpoint on a timer
//! - Classify the endpoint from its recent response times
//! - Back off the poll interval while it keeps failing
//! - Keep repeated failures from flooding the log

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{self, Instant};

use crate::config::HealthConfig;
use crate::health::probe::{HealthProbe, ProbeError, StatusBody};
use crate::observability::metrics;
use crate::resilience::grow_interval;
use crate::telemetry::TelemetryStore;

const COMPONENT: &str = "health";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceHealth {
    /// No check has completed yet.
    Unknown,
    Healthy,
    Degraded,
    Unavailable,
    Offline,
}

impl ServiceHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unavailable => "unavailable",
            Self::Offline => "offline",
        }
    }
}

/// Classify a response time.
pub fn classify(response_ms: f64, healthy_below_ms: u64, degraded_below_ms: u64) -> ServiceHealth {
    if response_ms < healthy_below_ms as f64 {
        ServiceHealth::Healthy
    } else if response_ms < degraded_below_ms as f64 {
        ServiceHealth::Degraded
    } else {
        ServiceHealth::Unavailable
    }
}

/// What to do with the log line for the nth consecutive failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureLog {
    Log,
    /// Log once that further failures are suppressed.
    Suppress,
    Silent,
}

pub fn failure_log_action(consecutive_failures: u32, max_logged: u32) -> FailureLog {
    if consecutive_failures <= max_logged {
        FailureLog::Log
    } else if consecutive_failures == max_logged + 1 {
        FailureLog::Suppress
    } else {
        FailureLog::Silent
    }
}

/// Published after every check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: ServiceHealth,
    pub consecutive_failures: u32,
    pub interval_secs: f64,
    pub response_times_ms: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_response_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<StatusBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl HealthReport {
    fn initial(interval: Duration) -> Self {
        Self {
            status: ServiceHealth::Unknown,
            consecutive_failures: 0,
            interval_secs: interval.as_secs_f64(),
            response_times_ms: Vec::new(),
            average_response_ms: None,
            last_check: None,
            last_success: None,
            remote: None,
            last_error: None,
        }
    }

    /// Anything but a failed last check counts as online.
    pub fn is_online(&self) -> bool {
        self.status != ServiceHealth::Offline
    }
}

struct PollState {
    interval: Duration,
    consecutive_failures: u32,
    samples: VecDeque<f64>,
}

pub struct HealthSupervisor {
    probe: Arc<dyn HealthProbe>,
    store: Arc<TelemetryStore>,
    config: HealthConfig,
    state: Mutex<PollState>,
    report: watch::Sender<HealthReport>,
}

impl HealthSupervisor {
    pub fn new(probe: Arc<dyn HealthProbe>, store: Arc<TelemetryStore>, config: HealthConfig) -> Self {
        let interval = Duration::from_secs(config.min_interval_secs);
        let (report, _) = watch::channel(HealthReport::initial(interval));
        Self {
            probe,
            store,
            state: Mutex::new(PollState {
                interval,
                consecutive_failures: 0,
                samples: VecDeque::with_capacity(config.sample_window),
            }),
            config,
            report,
        }
    }

    pub fn report(&self) -> HealthReport {
        self.report.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<HealthReport> {
        self.report.subscribe()
    }

    pub fn current_interval(&self) -> Duration {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).interval
    }

    /// Probe once and fold the result into the report.
    pub async fn check_now(&self) -> HealthReport {
        let started = Instant::now();
        let result = self.probe.probe().await;
        let elapsed = started.elapsed();

        match result {
            Ok(body) => self.record_success(body, elapsed),
            Err(e) => self.record_failure(e),
        }
        self.report()
    }

    fn record_success(&self, body: StatusBody, elapsed: Duration) {
        let response_ms = elapsed.as_secs_f64() * 1000.0;
        let status = classify(response_ms, self.config.healthy_below_ms, self.config.degraded_below_ms);

        let (recovered_after, interval, samples) = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let recovered_after = state.consecutive_failures;
            state.consecutive_failures = 0;
            state.interval = Duration::from_secs(self.config.min_interval_secs);
            if state.samples.len() >= self.config.sample_window.max(1) {
                state.samples.pop_front();
            }
            state.samples.push_back(response_ms);
            (recovered_after, state.interval, state.samples.iter().copied().collect::<Vec<_>>())
        };

        if recovered_after > 0 {
            tracing::info!(failures = recovered_after, "Status endpoint recovered");
            self.store.info(
                COMPONENT,
                format!("Status endpoint recovered after {} failed checks", recovered_after),
            );
        }
        tracing::debug!(status = status.as_str(), response_ms, "Status check succeeded");
        metrics::record_health_check(status.as_str(), Some(elapsed));

        let now = Utc::now();
        self.report.send_modify(|report| {
            report.average_response_ms = Some(samples.iter().sum::<f64>() / samples.len() as f64);
            report.status = status;
            report.consecutive_failures = 0;
            report.interval_secs = interval.as_secs_f64();
            report.response_times_ms = samples;
            report.last_check = Some(now);
            report.last_success = Some(now);
            report.remote = Some(body);
            report.last_error = None;
        });
    }

    fn record_failure(&self, error: ProbeError) {
        let (failures, interval) = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.consecutive_failures += 1;
            state.interval = grow_interval(
                state.interval,
                self.config.growth_factor,
                Duration::from_secs(self.config.max_interval_secs),
            );
            (state.consecutive_failures, state.interval)
        };

        match failure_log_action(failures, self.config.max_logged_failures) {
            FailureLog::Log => {
                tracing::warn!(failures, error = %error, next_check = ?interval, "Status check failed");
                self.store.warn(
                    COMPONENT,
                    format!("Status check failed ({} consecutive): {}", failures, error),
                );
            }
            FailureLog::Suppress => {
                tracing::warn!(failures, "Status checks keep failing, suppressing further logs");
                self.store.warn(
                    COMPONENT,
                    format!(
                        "Status check failed {} times in a row, suppressing further logs until it recovers",
                        failures
                    ),
                );
            }
            FailureLog::Silent => {}
        }
        metrics::record_health_check(ServiceHealth::Offline.as_str(), None);

        self.report.send_modify(|report| {
            report.status = ServiceHealth::Offline;
            report.consecutive_failures = failures;
            report.interval_secs = interval.as_secs_f64();
            report.last_check = Some(Utc::now());
            report.last_error = Some(error.to_string());
        });
    }

    /// Poll until shutdown. The timer restarts at the current interval after
    /// every check.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            url = %self.config.url,
            interval = self.config.min_interval_secs,
            "Health supervisor starting"
        );

        let next = time::sleep(Duration::from_secs(self.config.initial_delay_secs));
        tokio::pin!(next);
        loop {
            tokio::select! {
                _ = &mut next => {
                    self.check_now().await;
                    next.as_mut().reset(Instant::now() + self.current_interval());
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health supervisor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
