//! Resilient channel connections.
//!
//! # Data Flow
//! ```text
//! ConnectivityManager.connect(channel)
//!     → manager.rs worker (dial via Transport, backoff, latency probe)
//!         → status.rs (per-channel status, summary watch, diagnostics)
//!         → inbound messages broadcast
//!
//! websocket.rs implements transport.rs over tokio-tungstenite
//! ```

pub mod manager;
pub mod status;
pub mod transport;
pub mod websocket;

pub use manager::{ChannelMessage, ConnectivityError, ConnectivityManager};
pub use status::{ChannelState, ConnectionStatus, ConnectivitySummary};
pub use transport::{DisconnectReason, Transport, TransportError, TransportEvent, TransportSession};
pub use websocket::WebSocketTransport;
