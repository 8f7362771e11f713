//! Startup orchestration.
//!
//! # Responsibilities
//! - Build every component from a validated config, in dependency order
//! - Start background tasks (statistics, relays, channels, supervisor)
//! - Tear everything down in reverse order, flushing the log file last
//!
//! # Design Decisions
//! - Construction never spawns; `start` does
//! - Transport and probe are injectable so tests can run without sockets

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::config::HubConfig;
use crate::connectivity::{ConnectivityManager, Transport, TransportError, WebSocketTransport};
use crate::health::{HealthProbe, HealthSupervisor, HttpHealthProbe, ProbeError};
use crate::http::{AppState, HttpServer};
use crate::kpi::{HeroEngine, MetricSimulator, ServiceRegistry, StatisticsBoard};
use crate::lifecycle::Shutdown;
use crate::relay::{
    HeroMetricsRelay, LogFeed, LogRelay, MetricFeed, MetricRelay, PerformanceRelay, WindowFeed,
};
use crate::telemetry::{DailyFileSink, TelemetryStore};

const COMPONENT: &str = "lifecycle";

/// How long `stop` waits for background tasks.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("health probe: {0}")]
    Probe(#[from] ProbeError),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Remote dependencies, normally derived from the config.
#[derive(Default)]
pub struct Dependencies {
    pub transport: Option<Arc<dyn Transport>>,
    pub probe: Option<Arc<dyn HealthProbe>>,
}

impl Dependencies {
    /// Real transport and probe for whatever the config enables.
    pub fn from_config(config: &HubConfig) -> Result<Self, StartupError> {
        let transport: Option<Arc<dyn Transport>> = if config.connectivity.enabled {
            Some(Arc::new(WebSocketTransport::new(
                &config.connectivity.url,
                Duration::from_millis(config.connectivity.connect_timeout_ms),
            )?))
        } else {
            None
        };

        let probe: Option<Arc<dyn HealthProbe>> = if config.health.enabled {
            Some(Arc::new(HttpHealthProbe::new(
                &config.health.url,
                Duration::from_secs(config.health.timeout_secs),
            )?))
        } else {
            None
        };

        Ok(Self { transport, probe })
    }
}

/// Every long-lived component of a running hub.
pub struct Hub {
    config: HubConfig,
    state: AppState,
    shutdown: Arc<Shutdown>,
    tasks: Vec<JoinHandle<()>>,
}

impl Hub {
    /// Build from config with the real transport and probe.
    /// Must be called inside a Tokio runtime when a log directory is set.
    pub fn build(config: HubConfig) -> Result<Self, StartupError> {
        let deps = Dependencies::from_config(&config)?;
        Ok(Self::assemble(config, deps))
    }

    /// Build with explicit remote dependencies.
    pub fn assemble(config: HubConfig, deps: Dependencies) -> Self {
        let store = Arc::new(match &config.telemetry.log_dir {
            Some(dir) => TelemetryStore::with_sink(
                &config.telemetry,
                DailyFileSink::spawn(dir, config.telemetry.file_prefix.clone()),
            ),
            None => TelemetryStore::new(&config.telemetry),
        });

        let registry = Arc::new(ServiceRegistry::new());
        let board = Arc::new(StatisticsBoard::new(
            store.clone(),
            registry,
            config.statistics.clone(),
        ));

        let connectivity = deps.transport.map(|transport| {
            Arc::new(ConnectivityManager::new(
                transport,
                store.clone(),
                config.connectivity.clone(),
            ))
        });
        let supervisor = deps.probe.map(|probe| {
            Arc::new(HealthSupervisor::new(probe, store.clone(), config.health.clone()))
        });

        let relays = &config.relays;
        let logs = Arc::new(LogRelay::new("logs", LogFeed::new(store.clone()), relays.logs_buffer));
        let metrics = Arc::new(MetricRelay::new(
            "metrics",
            MetricFeed::new(store.clone()),
            relays.metrics_buffer,
        ));
        let performance = Arc::new(PerformanceRelay::new(
            "performance",
            WindowFeed::new(board.clone()),
            relays.performance_buffer,
        ));

        let engine = HeroEngine::new(
            store.clone(),
            board.clone(),
            config.statistics.hero_window,
            config.statistics.flagged_threshold_percent,
        );
        let hero = Arc::new(HeroMetricsRelay::new(
            store.clone(),
            board.clone(),
            engine,
            supervisor.as_ref().map(|s| s.watch()),
            connectivity.as_ref().map(|c| c.watch_summary()),
        ));

        let simulator = Arc::new(MetricSimulator::new(board.clone(), config.simulation.clone()));

        let state = AppState {
            store,
            board,
            logs,
            metrics,
            performance,
            hero,
            connectivity,
            supervisor,
            simulator,
            started_at: Instant::now(),
            version: config.server.version.clone(),
        };

        Self {
            config,
            state,
            shutdown: Arc::new(Shutdown::new()),
            tasks: Vec::new(),
        }
    }

    /// Start background work. Must be called inside a Tokio runtime.
    pub fn start(&mut self) {
        let state = &self.state;
        let relays = &self.config.relays;

        self.tasks
            .push(tokio::spawn(state.board.clone().run(self.shutdown.subscribe())));
        if let Some(supervisor) = &state.supervisor {
            self.tasks
                .push(tokio::spawn(supervisor.clone().run(self.shutdown.subscribe())));
        }

        state.logs.start_monitoring(Duration::from_millis(relays.logs_quiet_ms));
        state.metrics.start_monitoring(Duration::from_millis(relays.metrics_quiet_ms));
        state
            .performance
            .start_monitoring(Duration::from_millis(relays.performance_quiet_ms));
        state.hero.start_monitoring(Duration::from_millis(relays.hero_quiet_ms));

        if let Some(connectivity) = &state.connectivity {
            connectivity.connect_all();
        }
        if self.config.simulation.enabled {
            state.simulator.start();
            state.hero.set_simulation_mode(true);
        }

        tracing::info!(
            connectivity = state.connectivity.is_some(),
            supervisor = state.supervisor.is_some(),
            simulation = self.config.simulation.enabled,
            "Telemetry hub started"
        );
        state.store.info(COMPONENT, "Telemetry hub started");
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub fn shutdown_handle(&self) -> Arc<Shutdown> {
        self.shutdown.clone()
    }

    pub fn http_server(&self) -> HttpServer {
        HttpServer::new(&self.config.server, self.state())
    }

    /// Stop everything and flush the log file.
    pub async fn stop(self) {
        let Hub {
            state,
            shutdown,
            tasks,
            ..
        } = self;

        state.store.info(COMPONENT, "Telemetry hub stopping");
        shutdown.trigger();

        state.simulator.stop();
        state.hero.stop_monitoring();
        state.performance.stop_monitoring();
        state.metrics.stop_monitoring();
        state.logs.stop_monitoring();
        if let Some(connectivity) = &state.connectivity {
            connectivity.shutdown();
        }

        for task in tasks {
            if tokio::time::timeout(DRAIN_TIMEOUT, task).await.is_err() {
                tracing::warn!("Background task did not stop in time");
            }
        }

        state.store.close_streams();
        if let Some(sink) = state.store.take_sink() {
            sink.shutdown().await;
        }
        tracing::info!("Telemetry hub stopped");
    }
}
