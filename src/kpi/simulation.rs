//! Synthetic statistics for demo mode.

use chrono::Utc;
use rand::Rng;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::SimulationConfig;
use crate::derivation::ServiceStatistics;
use crate::kpi::board::StatisticsBoard;

/// Random but plausible statistics for one service.
pub fn random_statistics<R: Rng>(rng: &mut R) -> ServiceStatistics {
    ServiceStatistics {
        avg_response_time_ms: rng.gen_range(20.0..220.0),
        call_count: rng.gen_range(0..50),
        success_rate_percent: rng.gen_range(75.0..100.0),
        last_update: Utc::now(),
    }
}

/// Periodically overwrites every registered service's statistics.
pub struct MetricSimulator {
    board: Arc<StatisticsBoard>,
    config: SimulationConfig,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MetricSimulator {
    pub fn new(board: Arc<StatisticsBoard>, config: SimulationConfig) -> Self {
        Self {
            board,
            config,
            task: Mutex::new(None),
        }
    }

    /// Start (or restart) the simulation. Must be called inside a Tokio runtime.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = task.take() {
            handle.abort();
        }

        let board = self.board.clone();
        let min = self.config.min_interval_ms;
        let max = self.config.max_interval_ms.max(min);
        *task = Some(tokio::spawn(async move {
            // One period per run, like a fixed-rate timer.
            let period = Duration::from_millis(rand::thread_rng().gen_range(min..=max));
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let services = board.registry().list();
                let mut rng = rand::thread_rng();
                for service in &services {
                    board.apply(&service.name, random_statistics(&mut rng));
                }
                tracing::trace!(services = services.len(), "Simulated statistics applied");
            }
        }));
        tracing::info!("Metric simulation started");
    }

    /// Stop the simulation. Idempotent.
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
            tracing::info!("Metric simulation stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(false, |h| !h.is_finished())
    }
}

impl Drop for MetricSimulator {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StatisticsConfig, TelemetryConfig};
    use crate::kpi::ServiceRegistry;
    use crate::telemetry::TelemetryStore;

    #[test]
    fn test_random_statistics_in_range() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let s = random_statistics(&mut rng);
            assert!((20.0..220.0).contains(&s.avg_response_time_ms));
            assert!((75.0..100.0).contains(&s.success_rate_percent));
            assert!(s.call_count < 50);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulator_updates_registered_services() {
        let store = Arc::new(TelemetryStore::new(&TelemetryConfig::default()));
        let registry = Arc::new(ServiceRegistry::new());
        registry.register("ApiService", "", true);
        let board = Arc::new(StatisticsBoard::new(store, registry, StatisticsConfig::default()));

        let sim = MetricSimulator::new(board.clone(), SimulationConfig::default());
        sim.start();
        assert!(sim.is_running());
        tokio::time::sleep(Duration::from_millis(12_500)).await;
        assert!(board.statistics("ApiService").is_some());

        sim.stop();
        sim.stop();
        assert!(!sim.is_running());
    }
}
