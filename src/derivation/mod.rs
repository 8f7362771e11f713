//! Metric derivation engine.
//!
//! # Data Flow
//! ```text
//! Vec<ServiceCallMetric> (oldest first)
//!     → stats::window (lookback + sample cap)
//!     → stats::BatchStats::compute (avg, p95, success rate, errors)
//!     → smoothing::ServiceStatistics::absorb (EMA against previous)
//!     → delta::DeltaTracker (change since the caller's last sample)
//! ```
//!
//! # Design Decisions
//! - Every function is pure; state such as previous statistics or delta
//!   baselines is passed in by the caller
//! - Work is bounded by the sample cap, never by history length
//! - Malformed metrics are skipped, never reported as errors

pub mod delta;
pub mod smoothing;
pub mod stats;

pub use delta::DeltaTracker;
pub use smoothing::{ema, ServiceStatistics};
pub use stats::{latest_timed, window, BatchStats};
