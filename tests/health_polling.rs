//! Status endpoint polling.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use telemetry_hub::config::{HealthConfig, TelemetryConfig};
use telemetry_hub::health::{
    HealthProbe, HealthSupervisor, HttpHealthProbe, ProbeError, ServiceHealth, StatusBody,
};
use telemetry_hub::telemetry::{LogLevel, TelemetryStore};

mod common;
use common::{start_programmable_backend, status_body};

fn store() -> Arc<TelemetryStore> {
    Arc::new(TelemetryStore::new(&TelemetryConfig::default()))
}

fn health_logs(store: &TelemetryStore, level: LogLevel) -> usize {
    store
        .get_logs(1000, Some(level))
        .iter()
        .filter(|r| r.component.as_deref() == Some("health"))
        .count()
}

/// Replays a fixed list of outcomes, then keeps failing.
struct ScriptedProbe {
    outcomes: Mutex<VecDeque<Result<StatusBody, ProbeError>>>,
}

impl ScriptedProbe {
    fn new(outcomes: Vec<Result<StatusBody, ProbeError>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
        })
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self) -> Result<StatusBody, ProbeError> {
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ProbeError::Status(503)))
    }
}

fn ok_body() -> StatusBody {
    StatusBody {
        status: "ok".to_string(),
        uptime_seconds: 1.0,
        version: "1.2.3".to_string(),
    }
}

#[tokio::test]
async fn test_http_probe_healthy_backend() {
    let addr = start_programmable_backend(|| async { (200, status_body("1.2.3")) }).await;
    let probe = HttpHealthProbe::new(&format!("http://{}/health", addr), Duration::from_secs(2)).unwrap();
    let store = store();
    let supervisor = HealthSupervisor::new(Arc::new(probe), store.clone(), HealthConfig::default());

    let report = supervisor.check_now().await;
    assert_eq!(report.status, ServiceHealth::Healthy);
    assert!(report.is_online());
    assert_eq!(report.remote.unwrap().version, "1.2.3");
    assert_eq!(report.response_times_ms.len(), 1);
    assert!(report.average_response_ms.is_some());
    assert!(report.last_success.is_some());
}

#[tokio::test]
async fn test_http_probe_unavailable_backend_is_offline() {
    let addr = start_programmable_backend(|| async { (503, String::new()) }).await;
    let probe = HttpHealthProbe::new(&format!("http://{}/health", addr), Duration::from_secs(2)).unwrap();

    assert_eq!(probe.probe().await, Err(ProbeError::Status(503)));

    let supervisor = HealthSupervisor::new(Arc::new(probe), store(), HealthConfig::default());
    let report = supervisor.check_now().await;
    assert_eq!(report.status, ServiceHealth::Offline);
    assert!(!report.is_online());
    assert_eq!(report.consecutive_failures, 1);
    assert!(report.last_error.unwrap().contains("503"));
}

#[tokio::test]
async fn test_http_probe_empty_body_is_a_failure() {
    let addr = start_programmable_backend(|| async { (200, String::new()) }).await;
    let probe = HttpHealthProbe::new(&format!("http://{}/health", addr), Duration::from_secs(2)).unwrap();

    assert!(matches!(probe.probe().await, Err(ProbeError::Body(_))));
}

#[tokio::test]
async fn test_http_probe_refused_connection() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let probe = HttpHealthProbe::new(&format!("http://{}/health", addr), Duration::from_secs(2)).unwrap();
    assert!(matches!(probe.probe().await, Err(ProbeError::Request(_))));
}

#[tokio::test(start_paused = true)]
async fn test_interval_backs_off_and_resets_on_success() {
    let probe = ScriptedProbe::new(vec![
        Err(ProbeError::Status(500)),
        Err(ProbeError::Status(500)),
        Ok(ok_body()),
    ]);
    let supervisor = Arc::new(HealthSupervisor::new(probe, store(), HealthConfig::default()));
    let (tx, shutdown) = tokio::sync::broadcast::channel(1);
    let task = tokio::spawn(supervisor.clone().run(shutdown));

    assert_eq!(supervisor.report().status, ServiceHealth::Unknown);

    // First check after the initial delay.
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(supervisor.current_interval(), Duration::from_secs(90));
    assert_eq!(supervisor.report().status, ServiceHealth::Offline);

    tokio::time::sleep(Duration::from_secs(90)).await;
    assert_eq!(supervisor.current_interval(), Duration::from_secs(135));
    assert_eq!(supervisor.report().consecutive_failures, 2);

    tokio::time::sleep(Duration::from_secs(135)).await;
    let report = supervisor.report();
    assert_eq!(supervisor.current_interval(), Duration::from_secs(60));
    assert_eq!(report.consecutive_failures, 0);
    assert_eq!(report.interval_secs, 60.0);
    assert!(report.is_online());

    tx.send(()).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_interval_is_capped() {
    let supervisor = HealthSupervisor::new(ScriptedProbe::new(vec![]), store(), HealthConfig::default());
    for _ in 0..10 {
        supervisor.check_now().await;
    }
    assert_eq!(supervisor.current_interval(), Duration::from_secs(300));
    assert_eq!(supervisor.report().interval_secs, 300.0);
}

#[tokio::test(start_paused = true)]
async fn test_failure_logging_is_suppressed_until_recovery() {
    let mut outcomes: Vec<_> = (0..8).map(|_| Err(ProbeError::Status(503))).collect();
    outcomes.push(Ok(ok_body()));
    let store = store();
    let supervisor = HealthSupervisor::new(ScriptedProbe::new(outcomes), store.clone(), HealthConfig::default());

    for _ in 0..8 {
        supervisor.check_now().await;
    }
    // Five failures logged, one suppression notice, then silence.
    assert_eq!(health_logs(&store, LogLevel::Warn), 6);
    let newest = store.get_logs(1, Some(LogLevel::Warn));
    assert!(newest[0].message.contains("suppressing"));
    assert_eq!(supervisor.report().consecutive_failures, 8);

    supervisor.check_now().await;
    assert_eq!(health_logs(&store, LogLevel::Info), 1);
    let newest = store.get_logs(1, Some(LogLevel::Info));
    assert!(newest[0].message.contains("recovered after 8"));

    // The next outage logs again from the start.
    supervisor.check_now().await;
    assert_eq!(health_logs(&store, LogLevel::Warn), 7);
}
