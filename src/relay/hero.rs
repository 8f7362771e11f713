//! Hero KPI relay.
//!
//! Recomputes the headline snapshot on the audit cadence whenever logs,
//! the performance window, supervisor status or channel status change.

use arc_swap::ArcSwap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::connectivity::ConnectivitySummary;
use crate::health::HealthReport;
use crate::kpi::{DataMode, HealthFlags, HeroEngine, HeroMetricsSnapshot, StatisticsBoard};
use crate::observability::metrics;
use crate::relay::audit::AuditTimer;
use crate::telemetry::{Broadcaster, LogBatch, MetricBatch, Subscription, TelemetryStore};

struct HeroCore {
    store: Arc<TelemetryStore>,
    board: Arc<StatisticsBoard>,
    engine: Mutex<HeroEngine>,
    data_mode: Mutex<DataMode>,
    current: ArcSwap<HeroMetricsSnapshot>,
    updates: Broadcaster<Arc<HeroMetricsSnapshot>>,
    health: Option<watch::Receiver<HealthReport>>,
    connectivity: Option<watch::Receiver<ConnectivitySummary>>,
}

impl HeroCore {
    fn flags(&self) -> HealthFlags {
        HealthFlags {
            // Without a supervisor there is nothing saying we are offline.
            online: self.health.as_ref().map_or(true, |rx| rx.borrow().is_online()),
            transport_connected: self
                .connectivity
                .as_ref()
                .map_or(false, |rx| rx.borrow().any_healthy),
        }
    }

    fn publish(&self, snapshot: HeroMetricsSnapshot) {
        let snapshot = Arc::new(snapshot);
        self.current.store(snapshot.clone());
        self.updates.publish(snapshot);
        metrics::record_relay_emission("hero", 1);
    }

    fn recompute(&self) {
        let flags = self.flags();
        let mode = self.data_mode.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let snapshot = self
            .engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .compute(flags, mode);
        self.publish(snapshot);
    }

    async fn run(
        self: Arc<Self>,
        quiet: Duration,
        mut logs: Subscription<LogBatch>,
        mut window: Subscription<MetricBatch>,
    ) {
        let mut health = self.health.clone();
        let mut connectivity = self.connectivity.clone();
        let mut timer = AuditTimer::new(quiet);

        loop {
            tokio::select! {
                batch = logs.recv() => {
                    if batch.is_none() {
                        tracing::warn!(relay = "hero", "Log stream ended, resubscribing");
                        tokio::time::sleep(quiet).await;
                        logs = self.store.subscribe_logs();
                    }
                    timer.arm();
                }
                batch = window.recv() => {
                    if batch.is_none() {
                        tracing::warn!(relay = "hero", "Window stream ended, resubscribing");
                        tokio::time::sleep(quiet).await;
                        window = self.board.subscribe_window();
                    }
                    timer.arm();
                }
                changed = changed(&mut health) => {
                    if changed {
                        timer.arm();
                    } else {
                        health = None;
                    }
                }
                changed = changed(&mut connectivity) => {
                    if changed {
                        timer.arm();
                    } else {
                        connectivity = None;
                    }
                }
                _ = timer.expired(), if timer.is_armed() => {
                    timer.disarm();
                    self.recompute();
                }
            }
        }
    }
}

/// Resolves when the watched value changes; `false` once the sender is gone.
/// Pending forever when there is nothing to watch.
async fn changed<T>(rx: &mut Option<watch::Receiver<T>>) -> bool {
    match rx {
        Some(rx) => rx.changed().await.is_ok(),
        None => std::future::pending().await,
    }
}

/// Throttled stream of [`HeroMetricsSnapshot`]s.
pub struct HeroMetricsRelay {
    core: Arc<HeroCore>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl HeroMetricsRelay {
    pub fn new(
        store: Arc<TelemetryStore>,
        board: Arc<StatisticsBoard>,
        engine: HeroEngine,
        health: Option<watch::Receiver<HealthReport>>,
        connectivity: Option<watch::Receiver<ConnectivitySummary>>,
    ) -> Self {
        Self {
            core: Arc::new(HeroCore {
                store,
                board,
                engine: Mutex::new(engine),
                data_mode: Mutex::new(DataMode::live()),
                current: ArcSwap::from_pointee(HeroMetricsSnapshot::initial()),
                updates: Broadcaster::new(),
                health,
                connectivity,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Emit a fresh snapshot now, then recompute on the audit cadence.
    /// Must be called inside a Tokio runtime.
    pub fn start_monitoring(&self, quiet: Duration) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = worker.take() {
            handle.abort();
        }
        let logs = self.core.store.subscribe_logs();
        let window = self.core.board.subscribe_window();
        self.core.recompute();
        *worker = Some(tokio::spawn(self.core.clone().run(quiet, logs, window)));
        tracing::debug!(relay = "hero", quiet = ?quiet, "Relay monitoring started");
    }

    /// Stop recomputing. Idempotent.
    pub fn stop_monitoring(&self) {
        if let Some(handle) = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
            tracing::debug!(relay = "hero", "Relay monitoring stopped");
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(false, |h| !h.is_finished())
    }

    /// Switch the data-mode flag and publish the change immediately.
    pub fn set_simulation_mode(&self, simulating: bool) {
        let mode = DataMode::from_flag(simulating);
        *self.core.data_mode.lock().unwrap_or_else(PoisonError::into_inner) = mode.clone();

        let mut snapshot = (**self.core.current.load()).clone();
        snapshot.data_mode = mode;
        self.core.publish(snapshot);
    }

    /// Last published snapshot.
    pub fn current(&self) -> Arc<HeroMetricsSnapshot> {
        self.core.current.load_full()
    }

    pub fn subscribe(&self) -> Subscription<Arc<HeroMetricsSnapshot>> {
        self.core.updates.subscribe()
    }
}

impl Drop for HeroMetricsRelay {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StatisticsConfig, TelemetryConfig};
    use crate::kpi::ServiceRegistry;

    fn relay() -> (Arc<TelemetryStore>, HeroMetricsRelay) {
        let store = Arc::new(TelemetryStore::new(&TelemetryConfig::default()));
        let board = Arc::new(StatisticsBoard::new(
            store.clone(),
            Arc::new(ServiceRegistry::new()),
            StatisticsConfig::default(),
        ));
        let engine = HeroEngine::new(store.clone(), board.clone(), 50, 85.0);
        (store.clone(), HeroMetricsRelay::new(store, board, engine, None, None))
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_on_start_and_after_quiet_period() {
        let (store, hero) = relay();
        let mut updates = hero.subscribe();

        hero.start_monitoring(Duration::from_millis(100));
        assert_eq!(updates.drain().len(), 1);

        for _ in 0..3 {
            store.error("test", "failure");
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        let emitted = updates.drain();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].errors.count, 3);
        assert_eq!(hero.current().errors.count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_mode_published_immediately() {
        let (_, hero) = relay();
        let mut updates = hero.subscribe();
        hero.set_simulation_mode(true);

        let snapshot = updates.try_recv().unwrap();
        assert!(snapshot.data_mode.is_simulating);
        assert_eq!(snapshot.data_mode.simulating_metrics.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let (store, hero) = relay();
        hero.start_monitoring(Duration::from_millis(10));
        hero.stop_monitoring();
        hero.stop_monitoring();
        assert!(!hero.is_monitoring());

        let mut updates = hero.subscribe();
        store.info("test", "ignored");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(updates.try_recv().is_none());
    }
}
