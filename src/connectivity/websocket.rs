//! WebSocket transport over tokio-tungstenite.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::connectivity::transport::{
    DisconnectReason, Transport, TransportError, TransportEvent, TransportSession,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials `<base_url>/<channel>`; the default channel uses the base URL as is.
pub struct WebSocketTransport {
    base_url: String,
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, TransportError> {
        let parsed = Url::parse(base_url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        match parsed.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(TransportError::InvalidUrl(format!(
                    "unsupported scheme '{}'",
                    other
                )))
            }
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            connect_timeout,
        })
    }

    pub fn channel_url(&self, channel: &str) -> String {
        let channel = channel.trim_matches('/');
        if channel.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, channel)
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, channel: &str) -> Result<Box<dyn TransportSession>, TransportError> {
        let url = self.channel_url(channel);
        tracing::debug!(url = %url, "Dialing channel");

        let (stream, _) = tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(&url))
            .await
            .map_err(|_| TransportError::Connect(format!("timeout after {:?}", self.connect_timeout)))?
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        Ok(Box::new(WebSocketSession {
            id: uuid::Uuid::new_v4().to_string(),
            stream,
            closed: None,
        }))
    }
}

struct WebSocketSession {
    id: String,
    stream: WsStream,
    closed: Option<DisconnectReason>,
}

#[async_trait]
impl TransportSession for WebSocketSession {
    fn connection_id(&self) -> &str {
        &self.id
    }

    async fn next_event(&mut self) -> TransportEvent {
        if let Some(reason) = &self.closed {
            return TransportEvent::Closed(reason.clone());
        }

        loop {
            let event = match self.stream.next().await {
                Some(Ok(Message::Text(text))) => TransportEvent::Message(text.to_string()),
                Some(Ok(Message::Binary(data))) => {
                    TransportEvent::Message(String::from_utf8_lossy(&data).into_owned())
                }
                Some(Ok(Message::Pong(payload))) => {
                    TransportEvent::Pong(String::from_utf8_lossy(&payload).into_owned())
                }
                // tungstenite queues the pong reply itself
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Frame(_))) => continue,
                Some(Ok(Message::Close(frame))) => TransportEvent::Closed(DisconnectReason::ServerClosed(
                    frame
                        .map(|f| f.reason.to_string())
                        .filter(|reason| !reason.is_empty()),
                )),
                Some(Err(e)) => TransportEvent::Closed(DisconnectReason::TransportError(e.to_string())),
                None => TransportEvent::Closed(DisconnectReason::TransportError(
                    "stream ended".to_string(),
                )),
            };

            if let TransportEvent::Closed(reason) = &event {
                self.closed = Some(reason.clone());
            }
            return event;
        }
    }

    async fn send_ping(&mut self, token: &str) -> Result<(), TransportError> {
        self.stream
            .send(Message::Ping(token.as_bytes().to_vec().into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) {
        if self.closed.is_none() {
            if let Err(e) = self.stream.close(None).await {
                tracing::debug!(connection_id = %self.id, error = %e, "Close handshake failed");
            }
            self.closed = Some(DisconnectReason::ClientClosed);
        }
    }
}
