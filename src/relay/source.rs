//! Upstream feeds a relay can attach to.

use std::sync::Arc;

use crate::kpi::StatisticsBoard;
use crate::telemetry::{LogRecord, Sequenced, ServiceCallMetric, Subscription, TelemetryStore};

/// A snapshot-plus-stream producer of sequenced items.
pub trait RelaySource: Send + Sync + 'static {
    type Item: Sequenced + Clone + Send + Sync + 'static;

    /// Current contents, oldest first.
    fn snapshot(&self) -> Vec<Self::Item>;

    /// Future batches only.
    fn subscribe(&self) -> Subscription<Vec<Self::Item>>;

    /// Per-item filter applied before dedup.
    fn accepts(&self, _item: &Self::Item) -> bool {
        true
    }
}

/// Every log record appended to the store.
#[derive(Debug, Clone)]
pub struct LogFeed {
    store: Arc<TelemetryStore>,
}

impl LogFeed {
    pub fn new(store: Arc<TelemetryStore>) -> Self {
        Self { store }
    }
}

impl RelaySource for LogFeed {
    type Item = Arc<LogRecord>;

    fn snapshot(&self) -> Vec<Self::Item> {
        let mut logs = self.store.log_snapshot();
        logs.reverse();
        logs
    }

    fn subscribe(&self) -> Subscription<Vec<Self::Item>> {
        self.store.subscribe_logs()
    }
}

/// Finalized service calls, optionally for a single service.
#[derive(Debug, Clone)]
pub struct MetricFeed {
    store: Arc<TelemetryStore>,
    service: Option<String>,
}

impl MetricFeed {
    pub fn new(store: Arc<TelemetryStore>) -> Self {
        Self {
            store,
            service: None,
        }
    }

    pub fn for_service(store: Arc<TelemetryStore>, service: impl Into<String>) -> Self {
        Self {
            store,
            service: Some(service.into()),
        }
    }
}

impl RelaySource for MetricFeed {
    type Item = Arc<ServiceCallMetric>;

    fn snapshot(&self) -> Vec<Self::Item> {
        match &self.service {
            Some(name) => self.store.service_metrics(name),
            None => self.store.metric_snapshot(),
        }
    }

    fn subscribe(&self) -> Subscription<Vec<Self::Item>> {
        self.store.subscribe_metrics()
    }

    fn accepts(&self, item: &Self::Item) -> bool {
        self.service
            .as_deref()
            .map_or(true, |name| item.service_name == name)
    }
}

/// The statistics board's flattened recent window. Every publication
/// overlaps the previous one.
#[derive(Clone)]
pub struct WindowFeed {
    board: Arc<StatisticsBoard>,
}

impl WindowFeed {
    pub fn new(board: Arc<StatisticsBoard>) -> Self {
        Self { board }
    }
}

impl RelaySource for WindowFeed {
    type Item = Arc<ServiceCallMetric>;

    fn snapshot(&self) -> Vec<Self::Item> {
        self.board.window()
    }

    fn subscribe(&self) -> Subscription<Vec<Self::Item>> {
        self.board.subscribe_window()
    }
}
