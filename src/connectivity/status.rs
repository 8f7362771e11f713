//! Channel status, aggregate view and diagnostics.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;

/// Per-channel state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    /// Automatic reconnects exhausted; needs a manual reconnect.
    Failed,
}

/// Observable state of one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    /// Empty for the default channel.
    pub channel_id: String,
    pub state: ChannelState,
    pub is_connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_disconnected_at: Option<DateTime<Utc>>,
    pub reconnect_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
}

impl ConnectionStatus {
    pub fn new(channel: &str) -> Self {
        Self {
            channel_id: channel.to_string(),
            state: ChannelState::Disconnected,
            is_connected: false,
            connection_id: None,
            last_error: None,
            last_connected_at: None,
            last_disconnected_at: None,
            reconnect_attempts: 0,
            latency_ms: None,
        }
    }

    /// Human-readable channel name.
    pub fn display_name(&self) -> &str {
        display_name(&self.channel_id)
    }

    pub(crate) fn mark_connecting(&mut self) {
        self.state = ChannelState::Connecting;
        self.is_connected = false;
    }

    pub(crate) fn mark_connected(&mut self, connection_id: &str) {
        self.state = ChannelState::Connected;
        self.is_connected = true;
        self.connection_id = Some(connection_id.to_string());
        self.last_connected_at = Some(Utc::now());
        self.reconnect_attempts = 0;
        self.last_error = None;
    }

    pub(crate) fn mark_disconnected(&mut self, error: Option<String>) {
        self.state = ChannelState::Disconnected;
        self.is_connected = false;
        self.connection_id = None;
        self.latency_ms = None;
        if self.last_disconnected_at.is_none() || self.last_connected_at > self.last_disconnected_at {
            self.last_disconnected_at = Some(Utc::now());
        }
        if error.is_some() {
            self.last_error = error;
        }
    }

    pub(crate) fn mark_failed(&mut self, error: String) {
        self.state = ChannelState::Failed;
        self.is_connected = false;
        self.connection_id = None;
        self.last_error = Some(error);
    }
}

pub fn display_name(channel: &str) -> &str {
    if channel.is_empty() {
        "default"
    } else {
        channel
    }
}

/// "N of M channels reachable".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivitySummary {
    pub connected: usize,
    pub total: usize,
    pub any_healthy: bool,
    /// Some but not all channels are connected.
    pub partial: bool,
}

impl ConnectivitySummary {
    pub fn from_statuses<'a>(statuses: impl IntoIterator<Item = &'a ConnectionStatus>) -> Self {
        let mut connected = 0;
        let mut total = 0;
        for status in statuses {
            total += 1;
            if status.is_connected {
                connected += 1;
            }
        }
        Self {
            connected,
            total,
            any_healthy: connected > 0,
            partial: connected > 0 && connected < total,
        }
    }
}

/// Suggestions when only some channels work.
pub fn partial_connectivity_suggestions(statuses: &[ConnectionStatus]) -> Vec<String> {
    let (working, failing): (Vec<_>, Vec<_>) = statuses.iter().partition(|s| s.is_connected);
    if working.is_empty() || failing.is_empty() {
        return Vec::new();
    }

    let names = |list: &[&ConnectionStatus]| {
        list.iter()
            .map(|s| s.display_name())
            .collect::<Vec<_>>()
            .join(", ")
    };
    vec![
        "Some channels are working while others are failing:".to_string(),
        format!("- Working channels: {}", names(&working)),
        format!("- Failing channels: {}", names(&failing)),
        "- The server is reachable; check handlers for the failing channels".to_string(),
    ]
}

/// Text report for one channel.
pub fn render_diagnostics(status: &ConnectionStatus) -> String {
    let name = status.display_name();
    let mut out = String::new();
    let _ = writeln!(out, "Channel {} diagnostics results:", name);
    let _ = writeln!(out, "- State: {:?}", status.state);
    let _ = writeln!(out, "- Connected: {}", if status.is_connected { "Yes" } else { "No" });
    if let Some(id) = &status.connection_id {
        let _ = writeln!(out, "- Connection ID: {}", id);
    }
    if let Some(latency) = status.latency_ms {
        let _ = writeln!(out, "- Latency: {:.1} ms", latency);
    }
    if let Some(at) = status.last_connected_at {
        let _ = writeln!(out, "- Last connected: {}", at.to_rfc3339());
    }
    if let Some(at) = status.last_disconnected_at {
        let _ = writeln!(out, "- Last disconnected: {}", at.to_rfc3339());
    }
    if let Some(err) = &status.last_error {
        let _ = writeln!(out, "- Last error: {}", err);
    }
    if status.reconnect_attempts > 0 {
        let _ = writeln!(out, "- Reconnect attempts: {}", status.reconnect_attempts);
    }

    if !status.is_connected {
        let _ = writeln!(out, "\n- Recommendations:");
        let _ = writeln!(out, "  • Check that the '{}' channel is configured on the server", name);
        let _ = writeln!(out, "  • Verify the server is accepting connections for this channel");
        let _ = writeln!(out, "  • Try a manual reconnect of '{}'", name);
        if status
            .last_error
            .as_deref()
            .map_or(false, |e| e.to_ascii_lowercase().contains("timeout") || e.contains("timed out"))
        {
            let _ = writeln!(
                out,
                "  • Connection timeout detected; check for overloaded handlers on this channel"
            );
        }
        if status.state == ChannelState::Failed {
            let _ = writeln!(out, "  • Automatic reconnects are exhausted; a manual reconnect is required");
        }
    }
    out
}
