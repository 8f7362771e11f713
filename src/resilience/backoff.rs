//! Exponential backoff schedules.

use std::time::Duration;

/// Delay before reconnect attempt `attempt` (1-based).
///
/// `min(max_ms, base_ms * factor^(attempt - 1))`, floored to whole
/// milliseconds. Attempt 0 means "no wait".
pub fn reconnect_delay(attempt: u32, base_ms: u64, max_ms: u64, factor: f64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    let raw = base_ms as f64 * factor.powi(exponent);
    let capped = if raw.is_finite() {
        raw.min(max_ms as f64)
    } else {
        max_ms as f64
    };

    Duration::from_millis(capped.floor() as u64)
}

/// Next poll interval after a failure: `current * factor`, capped at `max`.
pub fn grow_interval(current: Duration, factor: f64, max: Duration) -> Duration {
    let grown = current.as_secs_f64() * factor;
    if !grown.is_finite() || grown >= max.as_secs_f64() {
        max
    } else {
        Duration::from_secs_f64(grown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_schedule() {
        let delays: Vec<u64> = (1..=10)
            .map(|n| reconnect_delay(n, 2000, 30_000, 1.5).as_millis() as u64)
            .collect();
        assert_eq!(
            delays,
            vec![2000, 3000, 4500, 6750, 10125, 15187, 22781, 30000, 30000, 30000]
        );
    }

    #[test]
    fn test_backoff_is_monotonic_and_bounded() {
        let mut last = Duration::ZERO;
        for attempt in 1..200 {
            let delay = reconnect_delay(attempt, 100, 5000, 1.5);
            assert!(delay >= last);
            assert!(delay <= Duration::from_millis(5000));
            last = delay;
        }
        assert_eq!(reconnect_delay(u32::MAX, 100, 5000, 1.5), Duration::from_millis(5000));
    }

    #[test]
    fn test_zero_attempt() {
        assert_eq!(reconnect_delay(0, 2000, 30_000, 1.5), Duration::ZERO);
    }

    #[test]
    fn test_grow_interval() {
        let max = Duration::from_secs(300);
        let mut interval = Duration::from_secs(60);
        let mut seen = Vec::new();
        for _ in 0..6 {
            interval = grow_interval(interval, 1.5, max);
            seen.push(interval.as_secs());
        }
        assert_eq!(seen, vec![90, 135, 202, 300, 300, 300]);
    }
}
