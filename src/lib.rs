//! Telemetry hub library.
//!
//! Collects logs and service-call metrics, derives smoothed statistics and
//! headline KPIs, relays them to consumers on a throttled cadence, and keeps
//! track of remote channel connectivity and endpoint health.

// Core data path
pub mod config;
pub mod derivation;
pub mod kpi;
pub mod relay;
pub mod telemetry;

// Remote dependencies
pub mod connectivity;
pub mod health;

// Cross-cutting concerns
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::HubConfig;
pub use http::HttpServer;
pub use lifecycle::{Hub, Shutdown};
pub use telemetry::TelemetryStore;
