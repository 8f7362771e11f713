//! Per-channel connection supervision.
//!
//! # Responsibilities
//! - One worker task per channel that owns dialing and the open session
//! - Automatic reconnect with exponential backoff after non-deliberate drops
//! - Manual reconnect that reports success or failure to the caller
//! - Periodic latency probe with a correlation token
//!
//! # Design Decisions
//! - Single flight: starting a worker for a channel aborts the previous one
//! - Disconnect is synchronous; the aborted worker never reconnects
//! - A channel that exhausts its attempts stays `Failed` until a manual
//!   reconnect

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::ConnectivityConfig;
use crate::connectivity::status::{
    display_name, partial_connectivity_suggestions, render_diagnostics, ConnectionStatus,
    ConnectivitySummary,
};
use crate::connectivity::transport::{
    DisconnectReason, Transport, TransportError, TransportEvent, TransportSession,
};
use crate::observability::metrics;
use crate::resilience::{reconnect_delay, retry_with_timeout, RetryError};
use crate::telemetry::{Broadcaster, Subscription, TelemetryStore};

const COMPONENT: &str = "connectivity";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectivityError {
    #[error("reconnect of channel '{channel}' failed after {attempts} attempts: {reason}")]
    ReconnectFailed {
        channel: String,
        attempts: u32,
        reason: String,
    },
}

/// Inbound payload from one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMessage {
    pub channel: String,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

type FirstOutcome = oneshot::Sender<Result<(), TransportError>>;

struct Shared {
    transport: Arc<dyn Transport>,
    store: Arc<TelemetryStore>,
    config: ConnectivityConfig,
    statuses: DashMap<String, ConnectionStatus>,
    summary: watch::Sender<ConnectivitySummary>,
    messages: Broadcaster<ChannelMessage>,
}

impl Shared {
    fn update(&self, channel: &str, f: impl FnOnce(&mut ConnectionStatus)) {
        {
            let mut entry = self
                .statuses
                .entry(channel.to_string())
                .or_insert_with(|| ConnectionStatus::new(channel));
            f(entry.value_mut());
        }
        self.publish_summary();
    }

    fn snapshot(&self) -> Vec<ConnectionStatus> {
        let mut statuses: Vec<ConnectionStatus> =
            self.statuses.iter().map(|r| r.value().clone()).collect();
        statuses.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));
        statuses
    }

    fn publish_summary(&self) {
        let summary = ConnectivitySummary::from_statuses(&self.snapshot());
        self.summary.send_if_modified(|current| {
            if *current == summary {
                false
            } else {
                *current = summary;
                true
            }
        });
    }

    async fn run_channel(self: Arc<Self>, channel: String, mut first: Option<FirstOutcome>) {
        let name = display_name(&channel).to_string();
        let mut attempt: u32 = 0;

        loop {
            self.update(&channel, ConnectionStatus::mark_connecting);

            match self.transport.open(&channel).await {
                Ok(session) => {
                    attempt = 0;
                    let connection_id = session.connection_id().to_string();
                    self.update(&channel, |s| s.mark_connected(&connection_id));
                    if let Some(tx) = first.take() {
                        let _ = tx.send(Ok(()));
                    }
                    metrics::record_channel_connected(&channel, true);
                    tracing::info!(channel = %name, connection_id = %connection_id, "Channel connected");
                    self.store.info(COMPONENT, format!("Connected to channel {}", name));

                    let reason = self.drive(&channel, session).await;

                    self.update(&channel, |s| s.mark_disconnected(Some(reason.describe())));
                    metrics::record_channel_connected(&channel, false);
                    if reason.is_deliberate() {
                        return;
                    }
                    tracing::warn!(channel = %name, reason = %reason.describe(), "Channel dropped");
                    self.store.warn(
                        COMPONENT,
                        format!("Disconnected from channel {}: {}", name, reason.describe()),
                    );
                }
                Err(e) => {
                    self.update(&channel, |s| s.mark_disconnected(Some(e.to_string())));
                    if let Some(tx) = first.take() {
                        // Manual reconnect owns the retry policy.
                        let _ = tx.send(Err(e));
                        return;
                    }
                    tracing::warn!(channel = %name, error = %e, "Channel connect failed");
                }
            }

            attempt += 1;
            if attempt > self.config.max_attempts {
                let message = format!(
                    "gave up after {} reconnect attempts",
                    self.config.max_attempts
                );
                self.update(&channel, |s| s.mark_failed(message.clone()));
                tracing::error!(channel = %name, attempts = self.config.max_attempts, "Channel reconnect exhausted");
                self.store.error(COMPONENT, format!("Channel {} {}", name, message));
                return;
            }

            self.update(&channel, |s| s.reconnect_attempts = attempt);
            metrics::record_reconnect_attempt(&channel);
            let delay = reconnect_delay(
                attempt,
                self.config.base_delay_ms,
                self.config.max_delay_ms,
                self.config.backoff_factor,
            );
            tracing::info!(channel = %name, attempt, delay = ?delay, "Scheduling reconnect");
            tokio::time::sleep(delay).await;
        }
    }

    /// Pump one session until it ends.
    async fn drive(&self, channel: &str, mut session: Box<dyn TransportSession>) -> DisconnectReason {
        let period = Duration::from_secs(self.config.ping_interval_secs.max(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        let mut probe: Option<(String, Instant)> = None;

        loop {
            tokio::select! {
                event = session.next_event() => match event {
                    TransportEvent::Message(payload) => {
                        self.messages.publish(ChannelMessage {
                            channel: channel.to_string(),
                            payload,
                            received_at: Utc::now(),
                        });
                    }
                    TransportEvent::Pong(token) => {
                        if let Some((expected, sent_at)) = probe.take() {
                            if expected == token {
                                let latency = sent_at.elapsed().as_secs_f64() * 1000.0;
                                self.update(channel, |s| s.latency_ms = Some(latency));
                                tracing::trace!(channel, latency_ms = latency, "Latency probe answered");
                            } else {
                                probe = Some((expected, sent_at));
                            }
                        }
                    }
                    TransportEvent::Closed(reason) => return reason,
                },
                _ = ticker.tick() => {
                    let token = uuid::Uuid::new_v4().to_string();
                    if let Err(e) = session.send_ping(&token).await {
                        session.close().await;
                        return DisconnectReason::TransportError(e.to_string());
                    }
                    probe = Some((token, Instant::now()));
                }
            }
        }
    }
}

/// Owns every channel worker.
pub struct ConnectivityManager {
    shared: Arc<Shared>,
    workers: DashMap<String, JoinHandle<()>>,
}

impl ConnectivityManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<TelemetryStore>,
        config: ConnectivityConfig,
    ) -> Self {
        let (summary, _) = watch::channel(ConnectivitySummary::default());
        Self {
            shared: Arc::new(Shared {
                transport,
                store,
                config,
                statuses: DashMap::new(),
                summary,
                messages: Broadcaster::new(),
            }),
            workers: DashMap::new(),
        }
    }

    fn spawn_worker(&self, channel: &str, first: Option<FirstOutcome>, replace: bool) {
        let spawn = || tokio::spawn(self.shared.clone().run_channel(channel.to_string(), first));
        match self.workers.entry(channel.to_string()) {
            Entry::Occupied(mut entry) => {
                if !replace && !entry.get().is_finished() {
                    return;
                }
                entry.get().abort();
                entry.insert(spawn());
            }
            Entry::Vacant(entry) => {
                entry.insert(spawn());
            }
        }
    }

    /// Open a channel. No-op while a worker is already running for it.
    /// Must be called inside a Tokio runtime.
    pub fn connect(&self, channel: &str) {
        self.shared.update(channel, |_| {});
        self.spawn_worker(channel, None, false);
    }

    /// Open every configured channel.
    pub fn connect_all(&self) {
        for channel in self.shared.config.channels.clone() {
            self.connect(&channel);
        }
    }

    /// Tear a channel down without reconnecting. Idempotent.
    pub fn disconnect(&self, channel: &str) {
        let Some((_, worker)) = self.workers.remove(channel) else {
            return;
        };
        worker.abort();

        let was_connected = self.status(channel).map_or(false, |s| s.is_connected);
        self.shared.update(channel, |s| s.mark_disconnected(None));
        if was_connected {
            metrics::record_channel_connected(channel, false);
        }
        tracing::info!(channel = %display_name(channel), "Channel disconnected");
    }

    /// Tear down, wait the grace period, then dial with bounded retries.
    pub async fn reconnect(&self, channel: &str) -> Result<(), ConnectivityError> {
        let name = display_name(channel).to_string();
        let attempts = self.shared.config.manual_attempts.max(1);
        self.shared
            .store
            .info(COMPONENT, format!("Manual reconnect of channel {}", name));

        self.disconnect(channel);
        tokio::time::sleep(Duration::from_millis(self.shared.config.manual_grace_ms)).await;

        let per_attempt = Duration::from_millis(self.shared.config.manual_timeout_ms);
        let result = retry_with_timeout(attempts, per_attempt, |attempt| {
            tracing::debug!(channel = %name, attempt, "Manual reconnect attempt");
            let (tx, rx) = oneshot::channel();
            self.spawn_worker(channel, Some(tx), true);
            async move {
                match rx.await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(TransportError::Connect("worker stopped".to_string())),
                }
            }
        })
        .await;

        match result {
            Ok(()) => {
                self.shared
                    .store
                    .info(COMPONENT, format!("Manual reconnect of channel {} succeeded", name));
                Ok(())
            }
            Err(e) => {
                // The last try may still be dialing.
                if let Some((_, worker)) = self.workers.remove(channel) {
                    worker.abort();
                }
                let reason = match e {
                    RetryError::TimedOut(after) => format!("connection timeout after {:?}", after),
                    RetryError::Failed(err) => err.to_string(),
                };
                self.shared
                    .update(channel, |s| s.mark_disconnected(Some(reason.clone())));
                self.shared.store.error(
                    COMPONENT,
                    format!("Manual reconnect of channel {} failed: {}", name, reason),
                );
                Err(ConnectivityError::ReconnectFailed {
                    channel: channel.to_string(),
                    attempts,
                    reason,
                })
            }
        }
    }

    pub fn status(&self, channel: &str) -> Option<ConnectionStatus> {
        self.shared.statuses.get(channel).map(|r| r.value().clone())
    }

    /// All known channels, sorted by name.
    pub fn statuses(&self) -> Vec<ConnectionStatus> {
        self.shared.snapshot()
    }

    pub fn summary(&self) -> ConnectivitySummary {
        *self.shared.summary.borrow()
    }

    pub fn watch_summary(&self) -> watch::Receiver<ConnectivitySummary> {
        self.shared.summary.subscribe()
    }

    /// Text report for one channel, with partial-connectivity hints.
    pub fn diagnose(&self, channel: &str) -> Option<String> {
        let status = self.status(channel)?;
        let mut report = render_diagnostics(&status);

        let suggestions = partial_connectivity_suggestions(&self.statuses());
        if !status.is_connected && !suggestions.is_empty() {
            report.push('\n');
            for line in suggestions {
                report.push_str(&line);
                report.push('\n');
            }
        }
        Some(report)
    }

    pub fn subscribe_messages(&self) -> Subscription<ChannelMessage> {
        self.shared.messages.subscribe()
    }

    /// Disconnect everything and end message subscriptions.
    pub fn shutdown(&self) {
        let channels: Vec<String> = self.workers.iter().map(|r| r.key().clone()).collect();
        for channel in channels {
            self.disconnect(&channel);
        }
        self.shared.messages.close_all();
    }
}

impl Drop for ConnectivityManager {
    fn drop(&mut self) {
        for worker in self.workers.iter() {
            worker.value().abort();
        }
    }
}
