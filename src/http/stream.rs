//! Live relay feeds over WebSocket.
//!
//! Each connection gets a `snapshot` frame first, then one frame per relay
//! emission (`batch` or `cleared`). Ping frames are answered by the
//! WebSocket layer.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use serde::Serialize;
use serde_json::json;

use crate::http::server::AppState;
use crate::relay::RelayUpdate;
use crate::telemetry::Subscription;

/// Relay a socket can follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    Logs,
    Metrics,
    Performance,
    Hero,
}

impl Feed {
    /// Unknown names fall back to the log feed.
    pub fn parse(name: &str) -> Self {
        match name.trim_matches('/') {
            "metrics" => Feed::Metrics,
            "performance" => Feed::Performance,
            "hero" => Feed::Hero,
            _ => Feed::Logs,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Feed::Logs => "logs",
            Feed::Metrics => "metrics",
            Feed::Performance => "performance",
            Feed::Hero => "hero",
        }
    }
}

pub async fn default_feed(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve(socket, state, Feed::Logs))
}

pub async fn named_feed(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(feed): Path<String>,
) -> Response {
    let feed = Feed::parse(&feed);
    ws.on_upgrade(move |socket| serve(socket, state, feed))
}

async fn serve(socket: WebSocket, state: AppState, feed: Feed) {
    tracing::debug!(feed = feed.as_str(), "Stream client connected");
    // Subscribe before reading the snapshot so nothing falls in between.
    match feed {
        Feed::Logs => {
            let updates = state.logs.subscribe();
            pump(socket, feed, state.logs.snapshot(), updates).await
        }
        Feed::Metrics => {
            let updates = state.metrics.subscribe();
            pump(socket, feed, state.metrics.snapshot(), updates).await
        }
        Feed::Performance => {
            let updates = state.performance.subscribe();
            pump(socket, feed, state.performance.snapshot(), updates).await
        }
        Feed::Hero => pump_hero(socket, state).await,
    }
    tracing::debug!(feed = feed.as_str(), "Stream client disconnected");
}

async fn send_json(socket: &mut WebSocket, frame: serde_json::Value) -> bool {
    socket.send(Message::Text(frame.to_string().into())).await.is_ok()
}

/// Whether an inbound frame ends the session.
fn is_terminal(incoming: Option<Result<Message, axum::Error>>) -> bool {
    matches!(incoming, None | Some(Err(_)) | Some(Ok(Message::Close(_))))
}

async fn pump<T: Serialize>(
    mut socket: WebSocket,
    feed: Feed,
    initial: Vec<T>,
    mut updates: Subscription<RelayUpdate<T>>,
) {
    let feed_name = feed.as_str();
    if !send_json(&mut socket, json!({ "feed": feed_name, "type": "snapshot", "items": initial })).await {
        return;
    }

    loop {
        tokio::select! {
            update = updates.recv() => {
                let frame = match update {
                    Some(RelayUpdate::Batch(items)) => {
                        json!({ "feed": feed_name, "type": "batch", "items": items })
                    }
                    Some(RelayUpdate::Cleared) => json!({ "feed": feed_name, "type": "cleared" }),
                    None => break,
                };
                if !send_json(&mut socket, frame).await {
                    break;
                }
            }
            incoming = socket.recv() => {
                if is_terminal(incoming) {
                    break;
                }
            }
        }
    }
}

async fn pump_hero(mut socket: WebSocket, state: AppState) {
    let mut updates = state.hero.subscribe();
    let initial = state.hero.current();
    if !send_json(&mut socket, json!({ "feed": "hero", "type": "snapshot", "item": initial })).await {
        return;
    }

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(snapshot) = update else { break };
                if !send_json(&mut socket, json!({ "feed": "hero", "type": "snapshot", "item": snapshot })).await {
                    break;
                }
            }
            incoming = socket.recv() => {
                if is_terminal(incoming) {
                    break;
                }
            }
        }
    }
}
