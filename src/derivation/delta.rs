//! Change-since-last-sample tracking.

use std::collections::HashMap;

/// Previous scalar values, owned by whoever computes the deltas.
///
/// Each consumer keeps its own tracker so two dashboards never see each
/// other's baselines. Every key starts from a baseline of 0.
#[derive(Debug, Clone, Default)]
pub struct DeltaTracker {
    previous: HashMap<&'static str, f64>,
}

impl DeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// `current - previous[key]`, then remember `current`.
    pub fn delta(&mut self, key: &'static str, current: f64) -> f64 {
        let previous = self.previous.insert(key, current).unwrap_or(0.0);
        current - previous
    }

    /// Last value recorded for `key`.
    pub fn previous(&self, key: &str) -> Option<f64> {
        self.previous.get(key).copied()
    }

    /// Forget all baselines.
    pub fn reset(&mut self) {
        self.previous.clear();
    }
}
