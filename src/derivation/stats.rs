//! Batch statistics over finalized service calls.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::telemetry::ServiceCallMetric;

/// Instant statistics for one batch of calls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    /// Calls that carried a duration or a status.
    pub count: usize,
    pub avg_response_time_ms: f64,
    pub p95_response_time_ms: f64,
    pub success_rate_percent: f64,
    pub error_count: usize,
}

impl BatchStats {
    /// Statistics of an empty batch.
    pub const EMPTY: BatchStats = BatchStats {
        count: 0,
        avg_response_time_ms: 0.0,
        p95_response_time_ms: 0.0,
        success_rate_percent: 100.0,
        error_count: 0,
    };

    /// Compute statistics for `metrics`.
    ///
    /// Calls without a status are left out of the success rate; calls without
    /// a duration are left out of latency figures; calls with neither are
    /// ignored entirely.
    pub fn compute<M: AsRef<ServiceCallMetric>>(metrics: &[M]) -> BatchStats {
        let mut durations = Vec::with_capacity(metrics.len());
        let mut with_status = 0usize;
        let mut successes = 0usize;
        let mut errors = 0usize;
        let mut count = 0usize;

        for metric in metrics.iter().map(AsRef::as_ref) {
            if metric.duration_ms.is_none() && metric.status_code.is_none() {
                continue;
            }
            count += 1;
            if let Some(d) = metric.duration_ms.filter(|d| d.is_finite()) {
                durations.push(d);
            }
            if let Some(ok) = metric.is_success() {
                with_status += 1;
                if ok {
                    successes += 1;
                }
            }
            if metric.is_error() {
                errors += 1;
            }
        }

        let avg = mean(&durations);
        BatchStats {
            count,
            avg_response_time_ms: avg,
            p95_response_time_ms: percentile_95(&mut durations, avg),
            success_rate_percent: success_rate(successes, with_status),
            error_count: errors,
        }
    }
}

impl Default for BatchStats {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Mean of `values`, 0 when empty.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Percentage of successes; 100 when nothing was measured.
pub fn success_rate(successes: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        successes as f64 * 100.0 / total as f64
    }
}

/// Value at `floor(0.95 * n)` of the ascending durations, or `fallback`
/// below two samples.
pub fn percentile_95(durations: &mut [f64], fallback: f64) -> f64 {
    if durations.len() < 2 {
        return fallback;
    }
    durations.sort_by(f64::total_cmp);
    let index = ((durations.len() as f64) * 0.95).floor() as usize;
    durations[index.min(durations.len() - 1)]
}

/// The most recent `cap` metrics no older than `lookback` relative to `now`.
///
/// `metrics` must be oldest first; the result keeps that order.
pub fn window<M>(metrics: &[M], now: DateTime<Utc>, lookback: Duration, cap: usize) -> Vec<M>
where
    M: AsRef<ServiceCallMetric> + Clone,
{
    let horizon = chrono::Duration::from_std(lookback)
        .ok()
        .and_then(|d| now.checked_sub_signed(d));

    let recent: Vec<&M> = metrics
        .iter()
        .filter(|m| horizon.map_or(true, |h| m.as_ref().timestamp >= h))
        .collect();
    let skip = recent.len().saturating_sub(cap);
    recent.into_iter().skip(skip).cloned().collect()
}

/// The most recent `cap` metrics that carry a positive duration, oldest first.
pub fn latest_timed<M>(metrics: &[M], cap: usize) -> Vec<M>
where
    M: AsRef<ServiceCallMetric> + Clone,
{
    let mut out: Vec<M> = metrics
        .iter()
        .rev()
        .filter(|m| m.as_ref().duration_ms.map_or(false, |d| d > 0.0))
        .take(cap)
        .cloned()
        .collect();
    out.reverse();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::DerivedCounters;
    use std::sync::Arc;

    fn metric(duration: Option<f64>, status: Option<u16>) -> Arc<ServiceCallMetric> {
        metric_at(duration, status, Utc::now())
    }

    fn metric_at(duration: Option<f64>, status: Option<u16>, at: DateTime<Utc>) -> Arc<ServiceCallMetric> {
        Arc::new(ServiceCallMetric {
            seq: 0,
            id: "id".into(),
            service_name: "svc".into(),
            method: "GET".into(),
            url: "/".into(),
            timestamp: at,
            duration_ms: duration,
            status_code: status,
            counters: DerivedCounters::default(),
        })
    }

    #[test]
    fn test_three_successful_calls() {
        let batch = vec![
            metric(Some(100.0), Some(200)),
            metric(Some(200.0), Some(200)),
            metric(Some(300.0), Some(200)),
        ];
        let stats = BatchStats::compute(&batch);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.avg_response_time_ms, 200.0);
        assert_eq!(stats.success_rate_percent, 100.0);
        assert_eq!(stats.p95_response_time_ms, 300.0);
        assert_eq!(stats.error_count, 0);
    }

    #[test]
    fn test_empty_batch_is_optimistic() {
        let stats = BatchStats::compute::<Arc<ServiceCallMetric>>(&[]);
        assert_eq!(stats, BatchStats::EMPTY);
        assert_eq!(stats.success_rate_percent, 100.0);
    }

    #[test]
    fn test_p95_falls_back_to_avg_for_single_sample() {
        let stats = BatchStats::compute(&[metric(Some(42.0), Some(200))]);
        assert_eq!(stats.p95_response_time_ms, 42.0);
    }

    #[test]
    fn test_partial_metrics() {
        let batch = vec![
            // Latency only.
            metric(Some(50.0), None),
            // Status only.
            metric(None, Some(500)),
            // Neither: ignored.
            metric(None, None),
            metric(Some(150.0), Some(201)),
        ];
        let stats = BatchStats::compute(&batch);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.avg_response_time_ms, 100.0);
        assert_eq!(stats.success_rate_percent, 50.0);
        assert_eq!(stats.error_count, 1);
    }

    #[test]
    fn test_p95_index_on_twenty_samples() {
        let batch: Vec<_> = (1..=20)
            .rev()
            .map(|d| metric(Some(d as f64), Some(200)))
            .collect();
        // floor(0.95 * 20) = 19 → the largest value.
        assert_eq!(BatchStats::compute(&batch).p95_response_time_ms, 20.0);
    }

    #[test]
    fn test_window_respects_lookback_and_cap() {
        let now = Utc::now();
        let old = metric_at(Some(1.0), Some(200), now - chrono::Duration::seconds(60));
        let mut batch = vec![old];
        for i in 0..12 {
            batch.push(metric_at(Some(i as f64), Some(200), now - chrono::Duration::seconds(5)));
        }

        let recent = window(&batch, now, Duration::from_secs(30), 10);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].duration_ms, Some(2.0));
        assert_eq!(recent[9].duration_ms, Some(11.0));
    }

    #[test]
    fn test_latest_timed_skips_zero_durations() {
        let batch = vec![
            metric(Some(10.0), Some(200)),
            metric(Some(0.0), Some(200)),
            metric(None, Some(200)),
            metric(Some(30.0), Some(200)),
        ];
        let timed = latest_timed(&batch, 5);
        let durations: Vec<_> = timed.iter().map(|m| m.duration_ms.unwrap()).collect();
        assert_eq!(durations, vec![10.0, 30.0]);
    }
}
