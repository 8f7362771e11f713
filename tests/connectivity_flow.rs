//! Channel state machine against a scripted transport.

use std::sync::Arc;
use std::time::Duration;

use telemetry_hub::config::{ConnectivityConfig, TelemetryConfig};
use telemetry_hub::connectivity::{ChannelState, ConnectivityManager, TransportEvent};
use telemetry_hub::telemetry::TelemetryStore;

mod common;
use common::MockTransport;

fn manager(transport: Arc<MockTransport>) -> ConnectivityManager {
    let mut config = ConnectivityConfig::default();
    config.channels = vec![String::new(), "admin".to_string()];
    ConnectivityManager::new(
        transport,
        Arc::new(TelemetryStore::new(&TelemetryConfig::default())),
        config,
    )
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_connects_after_failures_and_resets_attempts() {
    let transport = MockTransport::new(3);
    let manager = manager(transport.clone());

    manager.connect("");
    settle().await;
    let status = manager.status("").unwrap();
    assert_eq!(status.state, ChannelState::Disconnected);
    assert_eq!(status.reconnect_attempts, 1);

    // 2000 + 3000 + 4500 ms of backoff.
    tokio::time::sleep(Duration::from_millis(9_600)).await;
    let status = manager.status("").unwrap();
    assert_eq!(status.state, ChannelState::Connected);
    assert!(status.is_connected);
    assert_eq!(status.reconnect_attempts, 0);
    assert_eq!(status.connection_id.as_deref(), Some("mock-3"));
    assert_eq!(transport.dial_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_server_close_schedules_reconnect() {
    let transport = MockTransport::healthy();
    let manager = manager(transport.clone());

    manager.connect("");
    settle().await;
    assert!(manager.status("").unwrap().is_connected);

    transport.session(0).close_from_server();
    settle().await;
    let status = manager.status("").unwrap();
    assert_eq!(status.state, ChannelState::Disconnected);
    assert_eq!(status.reconnect_attempts, 1);
    assert!(status.last_disconnected_at.is_some());
    assert_eq!(status.last_error.as_deref(), Some("server closed"));

    tokio::time::sleep(Duration::from_millis(2_100)).await;
    assert!(manager.status("").unwrap().is_connected);
    assert_eq!(transport.dial_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_attempts_until_manual_reconnect() {
    // Initial dial plus ten automatic retries all fail.
    let transport = MockTransport::new(11);
    let manager = manager(transport.clone());

    manager.connect("");
    tokio::time::sleep(Duration::from_secs(200)).await;
    let status = manager.status("").unwrap();
    assert_eq!(status.state, ChannelState::Failed);
    assert_eq!(transport.dial_count(), 11);

    // Terminal: nothing else is dialed on its own.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.dial_count(), 11);

    manager.reconnect("").await.unwrap();
    let status = manager.status("").unwrap();
    assert_eq!(status.state, ChannelState::Connected);
    assert_eq!(status.reconnect_attempts, 0);
    assert_eq!(transport.dial_count(), 12);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_deliberate_and_idempotent() {
    let transport = MockTransport::healthy();
    let manager = manager(transport.clone());

    manager.connect("");
    settle().await;
    manager.disconnect("");
    manager.disconnect("");

    tokio::time::sleep(Duration::from_secs(60)).await;
    let status = manager.status("").unwrap();
    assert_eq!(status.state, ChannelState::Disconnected);
    assert_eq!(status.reconnect_attempts, 0);
    assert_eq!(transport.dial_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_manual_reconnect_dials_once() {
    let transport = MockTransport::healthy();
    let manager = manager(transport.clone());

    manager.connect("");
    settle().await;
    manager.reconnect("").await.unwrap();

    assert_eq!(transport.dial_count(), 2);
    assert!(manager.status("").unwrap().is_connected);
}

#[tokio::test(start_paused = true)]
async fn test_latency_probe_records_round_trip() {
    let transport = MockTransport::healthy();
    let manager = manager(transport.clone());

    manager.connect("");
    settle().await;
    assert!(manager.status("").unwrap().latency_ms.is_none());

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(transport.session(0).ping_count(), 1);
    assert!(manager.status("").unwrap().latency_ms.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_channels_fail_independently() {
    let transport = MockTransport::healthy();
    transport.fail_channel("admin");
    let manager = manager(transport.clone());
    let mut summary_rx = manager.watch_summary();

    manager.connect_all();
    settle().await;

    let summary = manager.summary();
    assert_eq!(summary.connected, 1);
    assert_eq!(summary.total, 2);
    assert!(summary.any_healthy);
    assert!(summary.partial);
    assert!(summary_rx.has_changed().unwrap());
    assert!(summary_rx.borrow_and_update().any_healthy);

    let report = manager.diagnose("admin").unwrap();
    assert!(report.contains("Connected: No"));
    assert!(report.contains("Working channels: default"));
    assert!(report.contains("Failing channels: admin"));
}

#[tokio::test(start_paused = true)]
async fn test_inbound_messages_are_broadcast() {
    let transport = MockTransport::healthy();
    let manager = manager(transport.clone());
    let mut messages = manager.subscribe_messages();

    manager.connect("admin");
    settle().await;
    transport
        .latest_session()
        .push(TransportEvent::Message(r#"{"event":"hello"}"#.to_string()));
    settle().await;

    let message = messages.try_recv().unwrap();
    assert_eq!(message.channel, "admin");
    assert_eq!(message.payload, r#"{"event":"hello"}"#);

    manager.shutdown();
    assert!(messages.recv().await.is_none());
}
