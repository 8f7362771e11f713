//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the query, ingestion and stream routes
//! - Wire up middleware (tracing, timeout, request accounting)
//! - Serve until the shutdown future resolves

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::connectivity::ConnectivityManager;
use crate::health::HealthSupervisor;
use crate::http::{handlers, stream, tracking};
use crate::kpi::{MetricSimulator, StatisticsBoard};
use crate::relay::{HeroMetricsRelay, LogRelay, MetricRelay, PerformanceRelay};
use crate::telemetry::TelemetryStore;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TelemetryStore>,
    pub board: Arc<StatisticsBoard>,
    pub logs: Arc<LogRelay>,
    pub metrics: Arc<MetricRelay>,
    pub performance: Arc<PerformanceRelay>,
    pub hero: Arc<HeroMetricsRelay>,
    pub connectivity: Option<Arc<ConnectivityManager>>,
    pub supervisor: Option<Arc<HealthSupervisor>>,
    pub simulator: Arc<MetricSimulator>,
    pub started_at: Instant,
    pub version: String,
}

/// HTTP front of the hub.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &ServerConfig, state: AppState) -> Self {
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        let api = Router::new()
            .route("/health", get(handlers::health))
            .route(
                "/api/logs",
                get(handlers::get_logs)
                    .post(handlers::ingest_log)
                    .delete(handlers::clear_logs),
            )
            .route(
                "/api/metrics",
                get(handlers::get_metrics).delete(handlers::clear_metrics),
            )
            .route("/api/calls", post(handlers::record_call))
            .route("/api/calls/start", post(handlers::start_call))
            .route("/api/calls/{id}/finish", post(handlers::finish_call))
            .route("/api/services", get(handlers::get_services))
            .route("/api/services/{name}/toggle", post(handlers::toggle_service))
            .route("/api/endpoints", get(handlers::get_endpoints))
            .route("/api/hero", get(handlers::get_hero))
            .route("/api/simulation", post(handlers::set_simulation))
            .route("/api/channels", get(handlers::get_channels))
            .route("/api/channels/{name}/diagnostics", get(handlers::diagnose_channel))
            .route("/api/channels/{name}/reconnect", post(handlers::reconnect_channel))
            .route("/api/supervisor", get(handlers::get_supervisor))
            .route_layer(middleware::from_fn(tracking::track_requests))
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)));

        // Streams are long-lived; keep them out of the request timeout.
        Router::new()
            .route("/ws", get(stream::default_feed))
            .route("/ws/{feed}", get(stream::named_feed))
            .merge(api)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
