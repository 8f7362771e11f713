//! Wire abstraction for channel connections.

use async_trait::async_trait;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// We closed it on purpose.
    ClientClosed,
    /// The peer sent a close frame.
    ServerClosed(Option<String>),
    /// The stream failed or ended without a close frame.
    TransportError(String),
}

impl DisconnectReason {
    /// Deliberate disconnects never trigger an automatic reconnect.
    pub fn is_deliberate(&self) -> bool {
        matches!(self, Self::ClientClosed)
    }

    pub fn describe(&self) -> String {
        match self {
            Self::ClientClosed => "client disconnect".to_string(),
            Self::ServerClosed(Some(reason)) => format!("server closed: {}", reason),
            Self::ServerClosed(None) => "server closed".to_string(),
            Self::TransportError(e) => format!("transport error: {}", e),
        }
    }
}

/// Something that happened on an open session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(String),
    /// Reply to a latency probe, carrying its correlation token.
    Pong(String),
    Closed(DisconnectReason),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

/// Dials channel sessions.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self, channel: &str) -> Result<Box<dyn TransportSession>, TransportError>;
}

/// One open connection.
#[async_trait]
pub trait TransportSession: Send {
    /// Identifier assigned when the session opened.
    fn connection_id(&self) -> &str;

    /// Next inbound event. Must be cancel-safe; returns `Closed` forever once
    /// the session has ended.
    async fn next_event(&mut self) -> TransportEvent;

    async fn send_ping(&mut self, token: &str) -> Result<(), TransportError>;

    async fn close(&mut self);
}
