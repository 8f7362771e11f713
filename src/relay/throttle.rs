//! Generic throttled relay.
//!
//! # Responsibilities
//! - Seed consumers from the source snapshot on start
//! - Drop items at or below the dedup watermark
//! - Coalesce bursts into one emission per quiet period
//! - Keep a bounded buffer of everything relayed
//!
//! # Design Decisions
//! - The watermark is the highest `seq` relayed (or queued); sources only
//!   ever append, so anything at or below it has been seen
//! - The worker task is the subscription; aborting it releases both the
//!   timer and the upstream queue in one step
//! - Source failures degrade to "no data this cycle"

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::observability::metrics;
use crate::relay::audit::AuditTimer;
use crate::relay::source::RelaySource;
use crate::telemetry::{Broadcaster, RingBuffer, Sequenced, Subscription};

/// What a relay emits to its consumers.
#[derive(Debug, Clone)]
pub enum RelayUpdate<T> {
    /// Newly relayed items, oldest first.
    Batch(Arc<[T]>),
    /// The relay was cleared; consumers should drop what they hold.
    Cleared,
}

struct RelayState<T> {
    buffer: RingBuffer<T>,
    pending: Vec<T>,
    last_emitted: u64,
    emissions: u64,
}

impl<T: Sequenced> RelayState<T> {
    fn high_water(&self) -> u64 {
        self.pending
            .last()
            .map(Sequenced::seq)
            .unwrap_or(self.last_emitted)
    }
}

struct RelayCore<S: RelaySource> {
    name: &'static str,
    source: S,
    state: Mutex<RelayState<S::Item>>,
    updates: Broadcaster<RelayUpdate<S::Item>>,
}

impl<S: RelaySource> RelayCore<S> {
    fn state(&self) -> std::sync::MutexGuard<'_, RelayState<S::Item>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue items newer than the watermark. Returns how many were queued.
    fn accept(&self, items: Vec<S::Item>) -> usize {
        let mut items: Vec<S::Item> = items
            .into_iter()
            .filter(|item| self.source.accepts(item))
            .collect();
        if items.is_empty() {
            return 0;
        }
        items.sort_by_key(Sequenced::seq);

        let mut state = self.state();
        let mut high = state.high_water();
        let mut queued = 0;
        for item in items {
            if item.seq() > high {
                high = item.seq();
                state.pending.push(item);
                queued += 1;
            }
        }

        // Never hold more than the buffer could keep anyway.
        let cap = state.buffer.capacity();
        if state.pending.len() > cap {
            let excess = state.pending.len() - cap;
            state.pending.drain(..excess);
        }
        queued
    }

    /// Emit everything queued as one batch.
    fn flush(&self) -> usize {
        let mut state = self.state();
        if state.pending.is_empty() {
            return 0;
        }
        let items = std::mem::take(&mut state.pending);
        if let Some(last) = items.last() {
            state.last_emitted = last.seq();
        }
        for item in &items {
            state.buffer.push(item.clone());
        }
        state.emissions += 1;

        let count = items.len();
        let batch: Arc<[S::Item]> = items.into();
        self.updates.publish(RelayUpdate::Batch(batch));
        drop(state);

        metrics::record_relay_emission(self.name, count);
        tracing::trace!(relay = self.name, items = count, "Relayed batch");
        count
    }

    async fn run(self: Arc<Self>, mut subscription: Subscription<Vec<S::Item>>, quiet: Duration) {
        let mut timer = AuditTimer::new(quiet);
        loop {
            tokio::select! {
                batch = subscription.recv() => match batch {
                    Some(items) => {
                        if self.accept(items) > 0 {
                            timer.arm();
                        }
                    }
                    None => {
                        tracing::warn!(relay = self.name, "Relay source stream ended, resubscribing");
                        tokio::time::sleep(quiet).await;
                        subscription = self.source.subscribe();
                        if self.accept(self.source.snapshot()) > 0 {
                            timer.arm();
                        }
                    }
                },
                _ = timer.expired(), if timer.is_armed() => {
                    timer.disarm();
                    self.flush();
                }
            }
        }
    }
}

/// Decouples a fast producer from slow consumers.
pub struct ThrottledRelay<S: RelaySource> {
    core: Arc<RelayCore<S>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<S: RelaySource> ThrottledRelay<S> {
    /// Create an idle relay keeping at most `capacity` relayed items.
    pub fn new(name: &'static str, source: S, capacity: usize) -> Self {
        Self {
            core: Arc::new(RelayCore {
                name,
                source,
                state: Mutex::new(RelayState {
                    buffer: RingBuffer::new(capacity),
                    pending: Vec::new(),
                    last_emitted: 0,
                    emissions: 0,
                }),
                updates: Broadcaster::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.core.name
    }

    /// Begin relaying. Restarts the worker if already running.
    ///
    /// Emits the not-yet-relayed part of the source snapshot right away.
    /// Must be called inside a Tokio runtime.
    pub fn start_monitoring(&self, quiet: Duration) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = worker.take() {
            handle.abort();
        }
        self.core.state().pending.clear();

        // Subscribe before reading the snapshot; overlap is removed by dedup.
        let subscription = self.core.source.subscribe();
        self.core.accept(self.core.source.snapshot());
        let seeded = self.core.flush();

        tracing::debug!(relay = self.core.name, seeded, quiet = ?quiet, "Relay monitoring started");
        *worker = Some(tokio::spawn(self.core.clone().run(subscription, quiet)));
    }

    /// Stop relaying. Idempotent; the watermark is kept.
    pub fn stop_monitoring(&self) {
        let handle = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            handle.abort();
            tracing::debug!(relay = self.core.name, "Relay monitoring stopped");
        }
        self.core.state().pending.clear();
    }

    pub fn is_monitoring(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(false, |h| !h.is_finished())
    }

    /// Forget everything relayed, including the watermark. The source is untouched.
    pub fn clear(&self) {
        let mut state = self.core.state();
        state.buffer.clear();
        state.pending.clear();
        state.last_emitted = 0;
        self.core.updates.publish(RelayUpdate::Cleared);
    }

    /// Up to `limit` relayed items, newest first.
    pub fn latest(&self, limit: usize) -> Vec<S::Item> {
        self.core.state().buffer.newest(limit)
    }

    /// All relayed items, oldest first.
    pub fn snapshot(&self) -> Vec<S::Item> {
        self.core.state().buffer.to_vec()
    }

    /// Highest `seq` relayed so far.
    pub fn watermark(&self) -> u64 {
        self.core.state().last_emitted
    }

    /// Number of non-empty emissions so far.
    pub fn emissions(&self) -> u64 {
        self.core.state().emissions
    }

    /// Future relay updates.
    pub fn subscribe(&self) -> Subscription<RelayUpdate<S::Item>> {
        self.core.updates.subscribe()
    }
}

impl<S: RelaySource> Drop for ThrottledRelay<S> {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item(u64);

    impl Sequenced for Item {
        fn seq(&self) -> u64 {
            self.0
        }
    }

    #[derive(Default)]
    struct ManualSource {
        history: Mutex<Vec<Item>>,
        stream: Broadcaster<Vec<Item>>,
    }

    struct SharedSource(Arc<ManualSource>);

    impl RelaySource for SharedSource {
        type Item = Item;

        fn snapshot(&self) -> Vec<Item> {
            self.0.history.lock().unwrap().clone()
        }

        fn subscribe(&self) -> Subscription<Vec<Item>> {
            self.0.stream.subscribe()
        }
    }

    fn relay(capacity: usize) -> (Arc<ManualSource>, ThrottledRelay<SharedSource>) {
        let source = Arc::new(ManualSource::default());
        let relay = ThrottledRelay::new("test", SharedSource(source.clone()), capacity);
        (source, relay)
    }

    fn batch_seqs(update: RelayUpdate<Item>) -> Vec<u64> {
        match update {
            RelayUpdate::Batch(items) => items.iter().map(|i| i.0).collect(),
            RelayUpdate::Cleared => panic!("unexpected clear"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_seed_batch_from_snapshot() {
        let (source, relay) = relay(10);
        source.history.lock().unwrap().extend([Item(1), Item(2)]);
        let mut updates = relay.subscribe();

        relay.start_monitoring(Duration::from_millis(50));
        assert_eq!(batch_seqs(updates.try_recv().unwrap()), vec![1, 2]);
        assert_eq!(relay.watermark(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_emission() {
        let (source, relay) = relay(10);
        let mut updates = relay.subscribe();
        relay.start_monitoring(Duration::from_millis(50));

        for seq in 1..=5 {
            source.stream.publish(vec![Item(seq)]);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(updates.try_recv().is_none());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(batch_seqs(updates.try_recv().unwrap()), vec![1, 2, 3, 4, 5]);
        assert!(updates.try_recv().is_none());
        assert_eq!(relay.emissions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_batches_are_dropped() {
        let (source, relay) = relay(10);
        let mut updates = relay.subscribe();
        relay.start_monitoring(Duration::from_millis(20));

        let batch = vec![Item(1), Item(2), Item(3)];
        source.stream.publish(batch.clone());
        tokio::time::sleep(Duration::from_millis(30)).await;
        source.stream.publish(batch);
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(batch_seqs(updates.try_recv().unwrap()), vec![1, 2, 3]);
        assert!(updates.try_recv().is_none());

        // Overlapping window with one new item.
        source.stream.publish(vec![Item(2), Item(3), Item(4)]);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(batch_seqs(updates.try_recv().unwrap()), vec![4]);
        assert_eq!(relay.latest(2), vec![Item(4), Item(3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_keeps_watermark() {
        let (source, relay) = relay(10);
        source.history.lock().unwrap().extend([Item(1), Item(2)]);
        relay.start_monitoring(Duration::from_millis(20));
        assert!(relay.is_monitoring());

        relay.stop_monitoring();
        relay.stop_monitoring();
        assert!(!relay.is_monitoring());

        // Events while stopped are not relayed.
        let mut updates = relay.subscribe();
        source.stream.publish(vec![Item(3)]);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(updates.try_recv().is_none());

        // Restart does not re-flood the old snapshot.
        source.history.lock().unwrap().push(Item(3));
        relay.start_monitoring(Duration::from_millis(20));
        assert_eq!(batch_seqs(updates.try_recv().unwrap()), vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_resets_watermark() {
        let (source, relay) = relay(10);
        source.history.lock().unwrap().extend([Item(1), Item(2)]);
        relay.start_monitoring(Duration::from_millis(20));
        relay.stop_monitoring();

        let mut updates = relay.subscribe();
        relay.clear();
        assert!(matches!(updates.try_recv(), Some(RelayUpdate::Cleared)));
        assert!(relay.latest(10).is_empty());
        assert_eq!(relay.watermark(), 0);
        // The source still has its data.
        assert_eq!(source.history.lock().unwrap().len(), 2);

        relay.start_monitoring(Duration::from_millis(20));
        assert_eq!(batch_seqs(updates.try_recv().unwrap()), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffer_is_bounded() {
        let (source, relay) = relay(3);
        relay.start_monitoring(Duration::from_millis(10));
        source.stream.publish((1..=5).map(Item).collect());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(relay.snapshot(), vec![Item(3), Item(4), Item(5)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_source_is_resubscribed() {
        let (source, relay) = relay(10);
        let mut updates = relay.subscribe();
        relay.start_monitoring(Duration::from_millis(10));

        source.stream.close_all();
        tokio::time::sleep(Duration::from_millis(20)).await;
        source.stream.publish(vec![Item(7)]);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(batch_seqs(updates.try_recv().unwrap()), vec![7]);
        assert!(relay.is_monitoring());
    }
}
