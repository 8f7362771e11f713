//! Trailing-edge coalescing timer.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Fires once `quiet` after the first event of a burst.
///
/// Later events in the same burst do not push the deadline back, so a
/// steady stream still produces one emission per quiet period.
#[derive(Debug, Clone)]
pub struct AuditTimer {
    quiet: Duration,
    deadline: Option<Instant>,
}

impl AuditTimer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadline: None,
        }
    }

    /// Start the window unless one is already open.
    pub fn arm(&mut self) {
        if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.quiet);
        }
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn quiet(&self) -> Duration {
        self.quiet
    }

    /// Resolves at the deadline. Only poll while [`is_armed`](Self::is_armed).
    pub fn expired(&self) -> impl Future<Output = ()> {
        sleep_until(self.deadline.unwrap_or_else(Instant::now))
    }
}
