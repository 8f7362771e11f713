//! Telemetry store subsystem.
//!
//! # Data Flow
//! ```text
//! producers (call sites, HTTP middleware, transport workers)
//!     → store.rs (assign seq, append to ring buffers)
//!         ├─→ ring.rs (bounded, oldest-first eviction)
//!         ├─→ broadcast.rs (fan-out to live subscribers)
//!         └─→ sink.rs (background append to daily JSONL file)
//!
//! consumers
//!     → snapshot()   for current contents
//!     → subscribe()  for future appends only
//! ```
//!
//! # Design Decisions
//! - Snapshot and subscribe are distinct operations; there is no implicit replay
//! - Subscribers are unbounded queues so producers never wait on consumers
//! - The file sink is best effort; its failures never reach producers

pub mod broadcast;
pub mod record;
pub mod ring;
pub mod sink;
pub mod store;

pub use broadcast::{Broadcaster, Subscription};
pub use record::{DerivedCounters, LogLevel, LogRecord, PendingCall, Sequenced, ServiceCallMetric};
pub use ring::RingBuffer;
pub use sink::DailyFileSink;
pub use store::{LogBatch, LogTally, MetricBatch, TelemetryStore};
