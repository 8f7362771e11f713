//! Shared utilities for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use telemetry_hub::config::HubConfig;
use telemetry_hub::connectivity::{
    DisconnectReason, Transport, TransportError, TransportEvent, TransportSession,
};
use telemetry_hub::lifecycle::{Dependencies, Hub};

/// Config with no file sink and no remote dependencies.
pub fn test_config() -> HubConfig {
    let mut config = HubConfig::default();
    config.telemetry.log_dir = None;
    config
}

pub fn test_hub(deps: Dependencies) -> Hub {
    Hub::assemble(test_config(), deps)
}

/// Start a programmable mock backend on an ephemeral port.
///
/// `f` returns the status code and body for each request.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        // Drain the request head before answering.
                        let mut buf = [0u8; 2048];
                        let _ = socket.read(&mut buf).await;

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            204 => "204 No Content",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Body of a healthy status endpoint.
pub fn status_body(version: &str) -> String {
    format!(
        r#"{{"status":"ok","uptimeSeconds":42.0,"version":"{}"}}"#,
        version
    )
}

/// Test-side handle to one open mock session.
#[derive(Clone)]
pub struct SessionHandle {
    pub channel: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    pub pings: Arc<Mutex<Vec<String>>>,
}

impl SessionHandle {
    pub fn push(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    pub fn close_from_server(&self) {
        self.push(TransportEvent::Closed(DisconnectReason::ServerClosed(None)));
    }

    pub fn ping_count(&self) -> usize {
        self.pings.lock().unwrap().len()
    }
}

/// Scripted transport: fails the first N dials, and always fails the
/// listed channels.
pub struct MockTransport {
    dials: AtomicU32,
    fail_first: u32,
    failing_channels: Mutex<HashSet<String>>,
    auto_pong: bool,
    sessions: Mutex<Vec<SessionHandle>>,
}

impl MockTransport {
    pub fn new(fail_first: u32) -> Arc<Self> {
        Arc::new(Self {
            dials: AtomicU32::new(0),
            fail_first,
            failing_channels: Mutex::new(HashSet::new()),
            auto_pong: true,
            sessions: Mutex::new(Vec::new()),
        })
    }

    pub fn healthy() -> Arc<Self> {
        Self::new(0)
    }

    pub fn unreachable() -> Arc<Self> {
        Self::new(u32::MAX)
    }

    pub fn fail_channel(&self, channel: &str) {
        self.failing_channels.lock().unwrap().insert(channel.to_string());
    }

    pub fn dial_count(&self) -> u32 {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn session(&self, index: usize) -> SessionHandle {
        self.sessions.lock().unwrap()[index].clone()
    }

    pub fn latest_session(&self) -> SessionHandle {
        self.sessions.lock().unwrap().last().unwrap().clone()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, channel: &str) -> Result<Box<dyn TransportSession>, TransportError> {
        let dial = self.dials.fetch_add(1, Ordering::SeqCst);
        if dial < self.fail_first || self.failing_channels.lock().unwrap().contains(channel) {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let pings = Arc::new(Mutex::new(Vec::new()));
        let handle = SessionHandle {
            channel: channel.to_string(),
            events: tx.clone(),
            pings: pings.clone(),
        };
        self.sessions.lock().unwrap().push(handle);

        Ok(Box::new(MockSession {
            id: format!("mock-{}", dial),
            events: rx,
            loopback: tx,
            pings,
            auto_pong: self.auto_pong,
        }))
    }
}

struct MockSession {
    id: String,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    loopback: mpsc::UnboundedSender<TransportEvent>,
    pings: Arc<Mutex<Vec<String>>>,
    auto_pong: bool,
}

#[async_trait]
impl TransportSession for MockSession {
    fn connection_id(&self) -> &str {
        &self.id
    }

    async fn next_event(&mut self) -> TransportEvent {
        self.events
            .recv()
            .await
            .unwrap_or(TransportEvent::Closed(DisconnectReason::TransportError(
                "dropped".to_string(),
            )))
    }

    async fn send_ping(&mut self, token: &str) -> Result<(), TransportError> {
        self.pings.lock().unwrap().push(token.to_string());
        if self.auto_pong {
            let _ = self.loopback.send(TransportEvent::Pong(token.to_string()));
        }
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self
            .loopback
            .send(TransportEvent::Closed(DisconnectReason::ClientClosed));
    }
}
