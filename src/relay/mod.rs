//! Throttled relays between the telemetry store and its consumers.
//!
//! # Data Flow
//! ```text
//! TelemetryStore / StatisticsBoard
//!     → source.rs (snapshot + live batches)
//!     → throttle.rs (dedup by seq → pending → audit timer → flush)
//!         → bounded buffer (latest / snapshot)
//!         → RelayUpdate stream (WebSocket clients, CLI)
//!
//! Instances:
//!     logs         LogFeed      500 ms / 500 records
//!     metrics      MetricFeed   2000 ms / 120 records
//!     performance  WindowFeed   1200 ms / 200 records
//!     hero         hero.rs      2500 ms, recomputed KPI snapshot
//! ```
//!
//! # Design Decisions
//! - Each relay owns its own clock; no ordering across relays
//! - `stop_monitoring` and drop abort the worker synchronously
//! - Consumers never see upstream errors

pub mod audit;
pub mod hero;
pub mod source;
pub mod throttle;

pub use audit::AuditTimer;
pub use hero::HeroMetricsRelay;
pub use source::{LogFeed, MetricFeed, RelaySource, WindowFeed};
pub use throttle::{RelayUpdate, ThrottledRelay};

pub type LogRelay = ThrottledRelay<LogFeed>;
pub type MetricRelay = ThrottledRelay<MetricFeed>;
pub type PerformanceRelay = ThrottledRelay<WindowFeed>;
