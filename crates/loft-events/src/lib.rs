//! loft-events — channel plumbing between the build workers and the store.
//!
//! Two Kafka topics carry everything that leaves an isolated worker: a
//! high-volume log topic (one message per build output line) and a
//! low-volume status topic (lifecycle transitions). This crate owns both
//! ends:
//!
//! - [`EventProducer`] — the worker-side handle. Publishes with a bounded
//!   retry; events that still cannot be sent are appended to a durable
//!   spill file and drained on the next open, so a channel outage degrades
//!   delivery latency instead of dropping events.
//! - [`LogIngestor`] / [`StatusIngestor`] — durable consumers with manual
//!   offset acknowledgment: a batch is written to the [`StateStore`] first
//!   and its offsets are committed only afterwards. Redelivery after a
//!   crash can duplicate entries; it never loses them.
//!
//! All handles are explicit (constructed once, passed down) — nothing in
//! this crate is process-global.
//!
//! [`StateStore`]: loft_state::StateStore

pub mod error;
pub mod ingest;
pub mod producer;
pub mod spill;

pub use error::{EventError, EventResult};
pub use ingest::{LogIngestor, StatusIngestor};
pub use producer::{EventProducer, Published};
pub use spill::Spill;
