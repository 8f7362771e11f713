//! Process-wide telemetry store.
//!
//! # Responsibilities
//! - Hold the most recent log records and finalized service calls in ring buffers
//! - Track in-flight calls until they are finalized, dropping the oldest past a cap
//! - Multicast every append to live subscribers (no replay)
//! - Mirror logs to `tracing`, Prometheus counters and the daily file sink
//!
//! # Design Decisions
//! - Appends never fail and never block; a full buffer evicts its oldest entry
//! - Sequence numbers are assigned and published under the buffer lock, so
//!   every subscriber observes the same order as `snapshot`
//! - Readers only see immutable `Arc` records

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::TelemetryConfig;
use crate::observability::metrics;
use crate::telemetry::broadcast::{Broadcaster, Subscription};
use crate::telemetry::record::{DerivedCounters, LogLevel, LogRecord, PendingCall, ServiceCallMetric};
use crate::telemetry::ring::RingBuffer;
use crate::telemetry::sink::DailyFileSink;

pub type LogBatch = Vec<Arc<LogRecord>>;
pub type MetricBatch = Vec<Arc<ServiceCallMetric>>;

/// Error/warning tally over the log buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogTally {
    pub errors: usize,
    pub warnings: usize,
    pub last_error: Option<DateTime<Utc>>,
}

struct LogState {
    buffer: RingBuffer<Arc<LogRecord>>,
    next_seq: u64,
}

struct MetricState {
    history: RingBuffer<Arc<ServiceCallMetric>>,
    by_service: HashMap<String, RingBuffer<Arc<ServiceCallMetric>>>,
    next_seq: u64,
}

/// Central append-only store for logs and service-call metrics.
pub struct TelemetryStore {
    logs: Mutex<LogState>,
    log_stream: Broadcaster<LogBatch>,
    metrics: Mutex<MetricState>,
    metric_stream: Broadcaster<MetricBatch>,
    /// In-flight calls keyed by id, tagged with their start order.
    active_calls: DashMap<String, (u64, PendingCall)>,
    next_call_ticket: AtomicU64,
    max_pending_calls: usize,
    per_service_capacity: usize,
    sink: Mutex<Option<DailyFileSink>>,
}

impl TelemetryStore {
    /// Create a store without a file sink.
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            logs: Mutex::new(LogState {
                buffer: RingBuffer::new(config.log_capacity),
                next_seq: 1,
            }),
            log_stream: Broadcaster::new(),
            metrics: Mutex::new(MetricState {
                history: RingBuffer::new(config.metric_history_capacity),
                by_service: HashMap::new(),
                next_seq: 1,
            }),
            metric_stream: Broadcaster::new(),
            active_calls: DashMap::new(),
            next_call_ticket: AtomicU64::new(0),
            max_pending_calls: config.max_pending_calls.max(1),
            per_service_capacity: config.metric_capacity_per_service,
            sink: Mutex::new(None),
        }
    }

    /// Create a store that also appends every log record to `sink`.
    pub fn with_sink(config: &TelemetryConfig, sink: DailyFileSink) -> Self {
        let store = Self::new(config);
        *store.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
        store
    }

    // --- Logs ---

    /// Log ingestion entry point.
    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        component: Option<&str>,
        details: Option<serde_json::Value>,
    ) -> Arc<LogRecord> {
        let mut record = LogRecord::new(level, message);
        record.component = component.map(str::to_string);
        record.details = details;
        self.append_log(record)
    }

    pub fn debug(&self, component: &str, message: impl Into<String>) -> Arc<LogRecord> {
        self.log(LogLevel::Debug, message, Some(component), None)
    }

    pub fn info(&self, component: &str, message: impl Into<String>) -> Arc<LogRecord> {
        self.log(LogLevel::Info, message, Some(component), None)
    }

    pub fn warn(&self, component: &str, message: impl Into<String>) -> Arc<LogRecord> {
        self.log(LogLevel::Warn, message, Some(component), None)
    }

    pub fn error(&self, component: &str, message: impl Into<String>) -> Arc<LogRecord> {
        self.log(LogLevel::Error, message, Some(component), None)
    }

    /// Append a record, assigning its sequence number.
    pub fn append_log(&self, mut record: LogRecord) -> Arc<LogRecord> {
        mirror_to_tracing(&record);
        metrics::record_log(record.level);

        let mut state = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        record.seq = state.next_seq;
        state.next_seq += 1;
        // Queued under the buffer lock so file lines keep sequence order.
        if let Some(sink) = self.sink.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            sink.write(&record);
        }
        let record = Arc::new(record);
        state.buffer.push(record.clone());
        self.log_stream.publish(vec![record.clone()]);
        record
    }

    /// Current log buffer, newest first.
    pub fn log_snapshot(&self) -> LogBatch {
        let state = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        state.buffer.newest(state.buffer.len())
    }

    /// Up to `limit` logs, newest first, optionally restricted to one level.
    pub fn get_logs(&self, limit: usize, level: Option<LogLevel>) -> LogBatch {
        let state = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .buffer
            .iter()
            .rev()
            .filter(|r| level.map_or(true, |l| r.level == l))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Empty the in-memory log buffer. The file sink is untouched.
    pub fn clear_logs(&self) -> bool {
        let mut state = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        state.buffer.clear();
        tracing::info!("In-memory log buffer cleared");
        true
    }

    pub fn log_count(&self) -> usize {
        self.logs.lock().unwrap_or_else(PoisonError::into_inner).buffer.len()
    }

    /// Count errors and warnings currently buffered.
    pub fn log_tally(&self) -> LogTally {
        let state = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        let mut tally = LogTally::default();
        for record in state.buffer.iter() {
            match record.level {
                LogLevel::Error => {
                    tally.errors += 1;
                    if tally.last_error.map_or(true, |t| record.timestamp > t) {
                        tally.last_error = Some(record.timestamp);
                    }
                }
                LogLevel::Warn => tally.warnings += 1,
                _ => {}
            }
        }
        tally
    }

    /// Live stream of future log appends.
    pub fn subscribe_logs(&self) -> Subscription<LogBatch> {
        self.log_stream.subscribe()
    }

    // --- Service calls ---

    /// Register the start of a call and return its identifier.
    pub fn start_call(&self, service_name: &str, method: &str, url: &str) -> String {
        let id = format!("{}_{}", service_name, Uuid::new_v4().simple());
        let pending = PendingCall {
            id: id.clone(),
            service_name: service_name.to_string(),
            method: method.to_string(),
            url: url.to_string(),
            timestamp: Utc::now(),
            started: Instant::now(),
        };
        tracing::debug!(call_id = %id, service = service_name, method, url, "Service call started");
        let ticket = self.next_call_ticket.fetch_add(1, Ordering::Relaxed);
        self.active_calls.insert(id.clone(), (ticket, pending));
        while self.active_calls.len() > self.max_pending_calls {
            if !self.evict_oldest_call() {
                break;
            }
        }
        id
    }

    /// Drop the earliest-started pending call. Returns `false` when none is left.
    fn evict_oldest_call(&self) -> bool {
        let oldest = self
            .active_calls
            .iter()
            .min_by_key(|entry| entry.value().0)
            .map(|entry| entry.key().clone());
        let Some(id) = oldest else {
            return false;
        };
        if let Some((_, (_, pending))) = self.active_calls.remove(&id) {
            tracing::debug!(
                call_id = %pending.id,
                service = %pending.service_name,
                cap = self.max_pending_calls,
                "Pending call dropped, too many in flight"
            );
        }
        true
    }

    /// Finalize a call started with [`start_call`](Self::start_call).
    ///
    /// Unknown identifiers are ignored.
    pub fn finish_call(&self, id: &str, status_code: Option<u16>) -> Option<Arc<ServiceCallMetric>> {
        let (_, (_, pending)) = self.active_calls.remove(id)?;
        let metric = pending.finish(status_code);
        tracing::debug!(
            call_id = %metric.id,
            service = %metric.service_name,
            duration_ms = metric.duration_ms.unwrap_or_default(),
            status = ?status_code,
            "Service call completed"
        );
        Some(self.append_metric(metric))
    }

    /// Record a call whose duration and status are already known.
    pub fn record_call(
        &self,
        service_name: &str,
        method: &str,
        url: &str,
        duration: Duration,
        status_code: Option<u16>,
    ) -> Arc<ServiceCallMetric> {
        let duration_ms = duration.as_secs_f64() * 1000.0;
        self.append_metric(ServiceCallMetric {
            seq: 0,
            id: format!("{}_{}", service_name, Uuid::new_v4().simple()),
            service_name: service_name.to_string(),
            method: method.to_string(),
            url: url.to_string(),
            timestamp: Utc::now(),
            duration_ms: Some(duration_ms),
            status_code,
            counters: DerivedCounters::for_call(duration_ms, status_code),
        })
    }

    /// Append a finalized metric, assigning its sequence number.
    pub fn append_metric(&self, mut metric: ServiceCallMetric) -> Arc<ServiceCallMetric> {
        metrics::record_service_call(&metric.service_name, metric.status_code, metric.duration_ms);

        let mut state = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
        metric.seq = state.next_seq;
        state.next_seq += 1;
        let metric = Arc::new(metric);

        state.history.push(metric.clone());
        let capacity = self.per_service_capacity;
        state
            .by_service
            .entry(metric.service_name.clone())
            .or_insert_with(|| RingBuffer::new(capacity))
            .push(metric.clone());

        self.metric_stream.publish(vec![metric.clone()]);
        metric
    }

    /// Metric history in insertion order.
    pub fn metric_snapshot(&self) -> MetricBatch {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .to_vec()
    }

    /// Up to `limit` most recent metrics, newest first.
    pub fn recent_metrics(&self, limit: usize) -> MetricBatch {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .newest(limit)
    }

    /// Metrics for one service in insertion order.
    pub fn service_metrics(&self, service_name: &str) -> MetricBatch {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_service
            .get(service_name)
            .map(RingBuffer::to_vec)
            .unwrap_or_default()
    }

    /// Services that have recorded at least one call.
    pub fn service_names(&self) -> Vec<String> {
        let state = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = state.by_service.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn active_call_count(&self) -> usize {
        self.active_calls.len()
    }

    /// Drop all finalized metrics. In-flight calls are kept.
    pub fn clear_metrics(&self) {
        let mut state = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
        state.history.clear();
        state.by_service.clear();
    }

    /// Live stream of future metric appends.
    pub fn subscribe_metrics(&self) -> Subscription<MetricBatch> {
        self.metric_stream.subscribe()
    }

    /// End every live subscription. Used during shutdown.
    pub fn close_streams(&self) {
        self.log_stream.close_all();
        self.metric_stream.close_all();
    }

    /// Detach the file sink so it can be flushed during shutdown.
    pub fn take_sink(&self) -> Option<DailyFileSink> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl std::fmt::Debug for TelemetryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryStore")
            .field("logs", &self.log_count())
            .field("active_calls", &self.active_calls.len())
            .field(
                "file_sink",
                &self.sink.lock().unwrap_or_else(PoisonError::into_inner).is_some(),
            )
            .finish()
    }
}

fn mirror_to_tracing(record: &LogRecord) {
    let component = record.component.as_deref().unwrap_or("app");
    match record.level {
        LogLevel::Debug => tracing::debug!(component, "{}", record.message),
        LogLevel::Info => tracing::info!(component, "{}", record.message),
        LogLevel::Warn => tracing::warn!(component, "{}", record.message),
        LogLevel::Error => tracing::error!(component, "{}", record.message),
    }
}
