//! HTTP surface of the hub.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum router, trace + timeout layers)
//!     → tracking.rs (request counters and timings)
//!     → handlers.rs (log and call ingestion, queries, channels, supervisor)
//!
//! WebSocket upgrade
//!     → stream.rs (relay updates pushed as JSON frames)
//! ```

pub mod handlers;
pub mod server;
pub mod stream;
pub mod tracking;

pub use server::{AppState, HttpServer};
