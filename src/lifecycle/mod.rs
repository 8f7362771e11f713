//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → store + sink → statistics board → channels / supervisor
//!     → relays → HTTP listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop relays and channels → drain tasks
//!     → close streams → flush log file
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Dependencies, Hub, StartupError};
