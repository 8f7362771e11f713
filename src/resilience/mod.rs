//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Transport dial fails:
//!     → backoff.rs (delay for attempt n, capped)
//!     → worker sleeps, then redials
//!
//! Manual reconnect:
//!     → retries.rs (bounded attempts, each raced against a timeout)
//!
//! Health probe fails:
//!     → backoff.rs (grow poll interval, capped)
//! ```
//!
//! # Design Decisions
//! - Schedules are pure functions; timers live with the caller
//! - Every external wait has a deadline

pub mod backoff;
pub mod retries;

pub use backoff::{grow_interval, reconnect_delay};
pub use retries::{retry_with_timeout, RetryError};
