//! Explicit pub-sub fan-out.
//!
//! Each subscriber owns an unbounded queue, so publishing never blocks and
//! every subscriber sees every event once, in publish order. Subscribers that
//! have been dropped are pruned on the next publish.

use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

/// Multicast sender with an explicit subscriber list.
#[derive(Debug)]
pub struct Broadcaster<T> {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<T>>>,
}

impl<T: Clone> Broadcaster<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Deliver `event` to every live subscriber.
    pub fn publish(&self, event: T) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Register a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        Subscription { rx }
    }

    /// Number of registered subscribers (including ones not yet pruned).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    /// Drop every subscriber; their streams end.
    pub fn close_all(&self) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl<T: Clone> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of a [`Broadcaster`] registration. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Wait for the next event. `None` once the broadcaster dropped this subscriber.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Non-blocking poll.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Drain everything currently queued.
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            out.push(event);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_subscriber_gets_every_event_in_order() {
        let hub = Broadcaster::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        for i in 0..5 {
            hub.publish(i);
        }

        assert_eq!(a.drain(), vec![0, 1, 2, 3, 4]);
        assert_eq!(b.drain(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_late_subscriber_sees_no_history() {
        let hub = Broadcaster::new();
        hub.publish("early");
        let mut late = hub.subscribe();
        hub.publish("late");
        assert_eq!(late.drain(), vec!["late"]);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let hub = Broadcaster::new();
        let keep = hub.subscribe();
        let gone = hub.subscribe();
        drop(gone);
        hub.publish(1u8);
        assert_eq!(hub.subscriber_count(), 1);
        drop(keep);
    }
}
