//! Remote status supervision.
//!
//! # Data Flow
//! ```text
//! supervisor.rs timer
//!     → probe.rs (GET status endpoint, parse {status, uptimeSeconds, version})
//!     → classify response time, grow/reset interval, suppress repeated logs
//!     → HealthReport watch (hero relay, admin API)
//! ```
//!
//! # Design Decisions
//! - A missing body or non-2xx response counts as offline
//! - The interval resets to the minimum on the first success

pub mod probe;
pub mod supervisor;

pub use probe::{HealthProbe, HttpHealthProbe, ProbeError, StatusBody};
pub use supervisor::{classify, HealthReport, HealthSupervisor, ServiceHealth};
