//! Per-service statistics board.
//!
//! # Responsibilities
//! - Keep EMA-smoothed statistics for every registered service
//! - Refresh a service whenever it reports a call, and all services on a timer
//! - Track per-service endpoint activity (hits, outcomes, recent timeline)
//! - Republish the flattened recent-call window for the performance relay
//!
//! # Design Decisions
//! - The board only reads the store through snapshot/subscribe
//! - The window is republished in full after every batch; consumers dedup by seq

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::config::StatisticsConfig;
use crate::derivation::{window, BatchStats, ServiceStatistics};
use crate::kpi::registry::ServiceRegistry;
use crate::telemetry::{Broadcaster, MetricBatch, ServiceCallMetric, Subscription, TelemetryStore};

const TIMELINE_LEN: usize = 50;

/// Coarse endpoint status derived from the last call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    Active,
    Error,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelinePoint {
    pub timestamp: DateTime<Utc>,
    pub response_time_ms: f64,
    pub status: u16,
}

/// Running activity for the endpoint a service talks to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointActivity {
    pub service_name: String,
    pub path: String,
    pub method: String,
    pub first_seen: DateTime<Utc>,
    pub last_contacted: DateTime<Utc>,
    pub status: EndpointStatus,
    pub hit_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub avg_response_time_ms: f64,
    pub timeline: VecDeque<TimelinePoint>,
}

impl EndpointActivity {
    fn new(metric: &ServiceCallMetric) -> Self {
        Self {
            service_name: metric.service_name.clone(),
            path: metric.url.clone(),
            method: metric.method.clone(),
            first_seen: Utc::now(),
            last_contacted: metric.timestamp,
            status: EndpointStatus::Inactive,
            hit_count: 0,
            success_count: 0,
            error_count: 0,
            avg_response_time_ms: 0.0,
            timeline: VecDeque::with_capacity(TIMELINE_LEN),
        }
    }

    fn record(&mut self, metric: &ServiceCallMetric) {
        let status = metric.status_code.unwrap_or(0);
        let duration = metric.duration_ms.unwrap_or(0.0);

        self.last_contacted = metric.timestamp;
        self.hit_count += 1;
        if (200..400).contains(&status) {
            self.success_count += 1;
        } else if status >= 400 {
            self.error_count += 1;
        }
        self.status = match status {
            0 => EndpointStatus::Inactive,
            s if s >= 500 => EndpointStatus::Error,
            _ => EndpointStatus::Active,
        };
        self.avg_response_time_ms +=
            (duration - self.avg_response_time_ms) / self.hit_count as f64;

        if self.timeline.len() == TIMELINE_LEN {
            self.timeline.pop_front();
        }
        self.timeline.push_back(TimelinePoint {
            timestamp: metric.timestamp,
            response_time_ms: duration,
            status,
        });
    }
}

/// Smoothed statistics for every service.
pub struct StatisticsBoard {
    store: Arc<TelemetryStore>,
    registry: Arc<ServiceRegistry>,
    config: StatisticsConfig,
    stats: DashMap<String, ServiceStatistics>,
    endpoints: DashMap<String, EndpointActivity>,
    window_stream: Broadcaster<MetricBatch>,
}

impl StatisticsBoard {
    pub fn new(
        store: Arc<TelemetryStore>,
        registry: Arc<ServiceRegistry>,
        config: StatisticsConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
            stats: DashMap::new(),
            endpoints: DashMap::new(),
            window_stream: Broadcaster::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Fold a batch of newly finalized calls into the board.
    pub fn absorb(&self, batch: &[Arc<ServiceCallMetric>]) {
        if batch.is_empty() {
            return;
        }

        let mut touched = BTreeSet::new();
        for metric in batch {
            self.registry.ensure(&metric.service_name);
            self.endpoints
                .entry(metric.service_name.clone())
                .or_insert_with(|| EndpointActivity::new(metric))
                .record(metric);
            touched.insert(metric.service_name.as_str());
        }

        let now = Utc::now();
        for name in touched {
            if self.registry.is_active(name) {
                self.refresh_recent(name, now);
            }
        }
        self.publish_window();
    }

    /// Update one service from its calls inside the lookback window.
    pub fn refresh_recent(&self, service: &str, now: DateTime<Utc>) {
        let metrics = self.store.service_metrics(service);
        let recent = window(
            &metrics,
            now,
            Duration::from_secs(self.config.lookback_secs),
            self.config.max_samples,
        );
        self.fold(service, &recent, now);
    }

    /// Periodic refresh of every registered service over its latest calls.
    pub fn poll(&self, now: DateTime<Utc>) {
        for service in self.registry.list() {
            let metrics = self.store.service_metrics(&service.name);
            let skip = metrics.len().saturating_sub(self.config.poll_samples);
            self.fold(&service.name, &metrics[skip..], now);
        }
    }

    fn fold(&self, service: &str, metrics: &[Arc<ServiceCallMetric>], now: DateTime<Utc>) {
        let batch = BatchStats::compute(metrics);
        let previous = self.stats.get(service).map(|s| s.value().clone());
        if let Some(next) =
            ServiceStatistics::absorb(previous.as_ref(), &batch, self.config.smoothing_factor, now)
        {
            self.stats.insert(service.to_string(), next);
        }
    }

    /// Overwrite a service's statistics (simulation mode).
    pub fn apply(&self, service: &str, stats: ServiceStatistics) {
        self.stats.insert(service.to_string(), stats);
    }

    pub fn statistics(&self, service: &str) -> Option<ServiceStatistics> {
        self.stats.get(service).map(|s| s.value().clone())
    }

    /// Statistics for every service that has some, sorted by name.
    pub fn all_statistics(&self) -> Vec<(String, ServiceStatistics)> {
        let mut all: Vec<_> = self
            .stats
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn endpoint_activity(&self) -> Vec<EndpointActivity> {
        let mut all: Vec<_> = self.endpoints.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        all
    }

    /// Most recent calls across all services, oldest first.
    pub fn window(&self) -> MetricBatch {
        let history = self.store.metric_snapshot();
        let skip = history.len().saturating_sub(self.config.performance_window);
        history[skip..].to_vec()
    }

    pub fn subscribe_window(&self) -> Subscription<MetricBatch> {
        self.window_stream.subscribe()
    }

    fn publish_window(&self) {
        self.window_stream.publish(self.window());
    }

    /// Drop statistics, endpoint activity and the store's finalized calls.
    pub fn clear(&self) {
        self.stats.clear();
        self.endpoints.clear();
        self.store.clear_metrics();
        self.publish_window();
        tracing::info!("Service statistics cleared");
    }

    /// Seed from the store and keep refreshing until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut metrics = self.store.subscribe_metrics();
        self.absorb(&self.store.metric_snapshot());

        let period = Duration::from_secs(self.config.refresh_interval_secs.max(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        tracing::info!(
            refresh_secs = period.as_secs(),
            lookback_secs = self.config.lookback_secs,
            "Statistics board started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Statistics board shutting down");
                    break;
                }
                batch = metrics.recv() => match batch {
                    Some(batch) => self.absorb(&batch),
                    None => {
                        tracing::warn!("Metric stream ended, resubscribing");
                        tokio::time::sleep(period).await;
                        metrics = self.store.subscribe_metrics();
                    }
                },
                _ = ticker.tick() => self.poll(Utc::now()),
            }
        }
    }
}

impl std::fmt::Debug for StatisticsBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatisticsBoard")
            .field("services", &self.stats.len())
            .finish()
    }
}
