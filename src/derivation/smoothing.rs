//! Exponential moving averages for per-service statistics.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::derivation::stats::BatchStats;

/// `previous + (raw - previous) * factor`.
pub fn ema(previous: f64, raw: f64, factor: f64) -> f64 {
    previous + (raw - previous) * factor
}

/// Smoothed statistics for one service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatistics {
    pub avg_response_time_ms: f64,
    pub call_count: usize,
    pub success_rate_percent: f64,
    pub last_update: DateTime<Utc>,
}

impl ServiceStatistics {
    /// Fold a new batch into `previous`.
    ///
    /// Returns `None` for an empty batch: statistics only ever come from
    /// real samples. The first batch is taken as-is.
    pub fn absorb(
        previous: Option<&ServiceStatistics>,
        batch: &BatchStats,
        factor: f64,
        now: DateTime<Utc>,
    ) -> Option<ServiceStatistics> {
        if batch.count == 0 {
            return None;
        }
        let next = match previous {
            None => ServiceStatistics {
                avg_response_time_ms: batch.avg_response_time_ms,
                call_count: batch.count,
                success_rate_percent: batch.success_rate_percent,
                last_update: now,
            },
            Some(prev) => ServiceStatistics {
                avg_response_time_ms: ema(prev.avg_response_time_ms, batch.avg_response_time_ms, factor),
                call_count: batch.count,
                success_rate_percent: ema(prev.success_rate_percent, batch.success_rate_percent, factor),
                last_update: now,
            },
        };
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ema_converges() {
        let mut value = 0.0;
        for _ in 0..40 {
            value = ema(value, 250.0, 0.3);
        }
        // 0.7^40 * 250 < 0.001
        assert!((value - 250.0).abs() < 1e-3);
    }

    #[test]
    fn test_ema_moves_monotonically_towards_raw() {
        let mut value = 500.0;
        let mut last_gap = f64::MAX;
        for _ in 0..10 {
            value = ema(value, 100.0, 0.3);
            let gap = (value - 100.0).abs();
            assert!(gap < last_gap);
            last_gap = gap;
        }
    }

    #[test]
    fn test_first_batch_taken_verbatim_then_smoothed() {
        let now = Utc::now();
        let batch = BatchStats {
            count: 3,
            avg_response_time_ms: 200.0,
            p95_response_time_ms: 300.0,
            success_rate_percent: 100.0,
            error_count: 0,
        };
        let first = ServiceStatistics::absorb(None, &batch, 0.3, now).unwrap();
        assert_eq!(first.avg_response_time_ms, 200.0);

        let slower = BatchStats {
            avg_response_time_ms: 300.0,
            success_rate_percent: 50.0,
            ..batch
        };
        let second = ServiceStatistics::absorb(Some(&first), &slower, 0.3, now).unwrap();
        assert!((second.avg_response_time_ms - 230.0).abs() < 1e-9);
        assert!((second.success_rate_percent - 85.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_batch_produces_nothing() {
        assert!(ServiceStatistics::absorb(None, &BatchStats::EMPTY, 0.3, Utc::now()).is_none());
    }
}
