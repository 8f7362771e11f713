//! Derived KPIs.
//!
//! # Data Flow
//! ```text
//! TelemetryStore.subscribe_metrics()
//!     → board.rs (register service, endpoint activity, EMA refresh)
//!         → window stream (flattened recent calls)
//!
//! registry.rs + board.rs + store log tally + health/connectivity signals
//!     → hero.rs (headline snapshot with caller-owned deltas)
//!
//! simulation.rs (optional) → board.rs (random statistics)
//! ```

pub mod board;
pub mod hero;
pub mod registry;
pub mod simulation;

pub use board::{EndpointActivity, EndpointStatus, StatisticsBoard};
pub use hero::{DataMode, HealthFlags, HeroEngine, HeroMetricsSnapshot};
pub use registry::{ServiceInfo, ServiceRegistry};
pub use simulation::MetricSimulator;
