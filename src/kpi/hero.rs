//! Headline KPI computation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::derivation::{latest_timed, BatchStats, DeltaTracker};
use crate::kpi::board::StatisticsBoard;
use crate::kpi::registry::ServiceRegistry;
use crate::telemetry::TelemetryStore;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ActiveServices {
    pub current: usize,
    pub total: usize,
    pub delta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessRate {
    pub value: f64,
    pub delta: f64,
    pub flagged_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorCounts {
    pub count: usize,
    pub warnings: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<DateTime<Utc>>,
}

/// Reachability signals supplied by the supervisor and connectivity manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthFlags {
    pub online: bool,
    pub transport_connected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResponseTime {
    pub avg: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Alerts {
    pub critical: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataMode {
    pub is_simulating: bool,
    pub simulating_metrics: Vec<String>,
}

impl DataMode {
    pub fn live() -> Self {
        Self {
            is_simulating: false,
            simulating_metrics: Vec::new(),
        }
    }

    pub fn simulated() -> Self {
        Self {
            is_simulating: true,
            simulating_metrics: ["Service Calls", "Response Times", "Success Rates", "Error Events"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    pub fn from_flag(simulating: bool) -> Self {
        if simulating {
            Self::simulated()
        } else {
            Self::live()
        }
    }
}

/// Dashboard headline figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeroMetricsSnapshot {
    pub active_services: ActiveServices,
    pub success_rate: SuccessRate,
    pub errors: ErrorCounts,
    pub health: HealthFlags,
    pub response_time: ResponseTime,
    pub alerts: Alerts,
    pub data_mode: DataMode,
    pub last_update: DateTime<Utc>,
}

impl HeroMetricsSnapshot {
    /// Snapshot shown before the first computation.
    pub fn initial() -> Self {
        Self {
            active_services: ActiveServices {
                current: 0,
                total: 0,
                delta: 0.0,
            },
            success_rate: SuccessRate {
                value: 100.0,
                delta: 0.0,
                flagged_count: 0,
            },
            errors: ErrorCounts {
                count: 0,
                warnings: 0,
                last_error: None,
            },
            health: HealthFlags {
                online: true,
                transport_connected: false,
            },
            response_time: ResponseTime { avg: 0.0, p95: 0.0 },
            alerts: Alerts {
                critical: 0,
                warnings: 0,
            },
            data_mode: DataMode::live(),
            last_update: Utc::now(),
        }
    }
}

/// Computes [`HeroMetricsSnapshot`]s. Owns its delta baselines.
pub struct HeroEngine {
    store: Arc<TelemetryStore>,
    registry: Arc<ServiceRegistry>,
    board: Arc<StatisticsBoard>,
    window: usize,
    flagged_below: f64,
    deltas: DeltaTracker,
}

impl HeroEngine {
    pub fn new(
        store: Arc<TelemetryStore>,
        board: Arc<StatisticsBoard>,
        window: usize,
        flagged_below: f64,
    ) -> Self {
        Self {
            store,
            registry: board.registry().clone(),
            board,
            window,
            flagged_below,
            deltas: DeltaTracker::new(),
        }
    }

    pub fn compute(&mut self, health: HealthFlags, data_mode: DataMode) -> HeroMetricsSnapshot {
        let services = self.registry.list();
        let (active, total) = self.registry.counts();
        let active_delta = self.deltas.delta("active_services", active as f64);

        let rates: Vec<f64> = services
            .iter()
            .filter_map(|s| self.board.statistics(&s.name))
            .map(|s| s.success_rate_percent)
            .collect();
        let avg_success = if rates.is_empty() {
            100.0
        } else {
            rates.iter().sum::<f64>() / rates.len() as f64
        };
        let success_delta = self.deltas.delta("success_rate", avg_success);
        let flagged = rates.iter().filter(|r| **r < self.flagged_below).count();

        let tally = self.store.log_tally();

        let recent = latest_timed(&self.board.window(), self.window);
        let latency = BatchStats::compute(&recent);

        HeroMetricsSnapshot {
            active_services: ActiveServices {
                current: active,
                total,
                delta: active_delta,
            },
            success_rate: SuccessRate {
                value: avg_success,
                delta: success_delta,
                flagged_count: flagged,
            },
            errors: ErrorCounts {
                count: tally.errors,
                warnings: tally.warnings,
                last_error: tally.last_error,
            },
            health,
            response_time: ResponseTime {
                avg: latency.avg_response_time_ms,
                p95: latency.p95_response_time_ms,
            },
            alerts: Alerts {
                critical: tally.errors,
                warnings: tally.warnings,
            },
            data_mode,
            last_update: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StatisticsConfig, TelemetryConfig};
    use std::time::Duration;

    fn engine() -> (Arc<TelemetryStore>, Arc<StatisticsBoard>, HeroEngine) {
        let store = Arc::new(TelemetryStore::new(&TelemetryConfig::default()));
        let board = Arc::new(StatisticsBoard::new(
            store.clone(),
            Arc::new(ServiceRegistry::new()),
            StatisticsConfig::default(),
        ));
        let engine = HeroEngine::new(store.clone(), board.clone(), 50, 85.0);
        (store, board, engine)
    }

    const ONLINE: HealthFlags = HealthFlags {
        online: true,
        transport_connected: true,
    };

    #[test]
    fn test_empty_system() {
        let (_, _, mut engine) = engine();
        let snapshot = engine.compute(ONLINE, DataMode::live());
        assert_eq!(snapshot.success_rate.value, 100.0);
        assert_eq!(snapshot.active_services.total, 0);
        assert_eq!(snapshot.response_time.avg, 0.0);
    }

    #[test]
    fn test_latency_and_deltas() {
        let (store, board, mut engine) = engine();
        let batch: Vec<_> = [100, 200, 300]
            .into_iter()
            .map(|ms| store.record_call("A", "GET", "/", Duration::from_millis(ms), Some(200)))
            .collect();
        board.absorb(&batch);

        let first = engine.compute(ONLINE, DataMode::live());
        assert_eq!(first.active_services.current, 1);
        assert_eq!(first.active_services.delta, 1.0);
        assert!((first.response_time.avg - 200.0).abs() < 1.0);
        assert!((first.response_time.p95 - 300.0).abs() < 1.0);
        assert_eq!(first.success_rate.delta, 100.0);

        let second = engine.compute(ONLINE, DataMode::live());
        assert_eq!(second.active_services.delta, 0.0);
        assert_eq!(second.success_rate.delta, 0.0);
    }

    #[test]
    fn test_flagged_services_and_log_counts() {
        let (store, board, mut engine) = engine();
        let failed = store.record_call("Flaky", "GET", "/", Duration::from_millis(5), Some(500));
        board.absorb(&[failed]);
        store.error("test", "boom");
        store.warn("test", "careful");

        let snapshot = engine.compute(ONLINE, DataMode::simulated());
        assert_eq!(snapshot.success_rate.flagged_count, 1);
        assert_eq!(snapshot.errors.count, 1);
        assert_eq!(snapshot.alerts.warnings, 1);
        assert!(snapshot.errors.last_error.is_some());
        assert!(snapshot.data_mode.is_simulating);
    }
}
