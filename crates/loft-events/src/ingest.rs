//! Durable channel consumers — log and status ingestion.
//!
//! Both ingestors follow the same at-least-once discipline: collect a
//! batch, write it to the store, and only then commit the offsets. A
//! store failure leaves the offsets uncommitted so the batch is
//! redelivered after a restart; the status gate and the append-only log
//! table make redelivery safe.
//!
//! Group heartbeats are sent by librdkafka's background thread, so a slow
//! store write cannot miss a heartbeat; `max.poll.interval.ms` is the only
//! bound on batch processing time.

use std::time::{Duration, Instant};

use rdkafka::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use loft_core::config::ChannelsConfig;
use loft_core::{LogEvent, StatusEvent};
use loft_state::{StateStore, StatusApplied};

use crate::error::EventResult;

/// Pause before re-polling after a channel error.
const RECV_ERROR_BACKOFF: Duration = Duration::from_secs(1);

fn consumer_from_config(config: &ChannelsConfig, topic: &str) -> EventResult<StreamConsumer> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &config.brokers)
        .set("group.id", &config.group)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set(
            "max.poll.interval.ms",
            config.max_poll_interval_ms.to_string(),
        )
        .create()?;
    consumer.subscribe(&[topic])?;
    Ok(consumer)
}

/// Decode a batch of payloads, skipping entries that are not valid JSON.
///
/// Undecodable payloads would poison the partition if left uncommitted,
/// so they are counted, logged by the caller, and committed with the rest
/// of the batch.
fn decode_payloads<'a, T, I>(payloads: I) -> (Vec<T>, usize)
where
    T: DeserializeOwned,
    I: IntoIterator<Item = Option<&'a [u8]>>,
{
    let mut events = Vec::new();
    let mut skipped = 0;
    for payload in payloads {
        match payload.and_then(|bytes| serde_json::from_slice(bytes).ok()) {
            Some(event) => events.push(event),
            None => skipped += 1,
        }
    }
    (events, skipped)
}

/// Collect up to `max_batch` messages, waiting at most `linger` past the
/// first one.
async fn next_batch<'a>(
    consumer: &'a StreamConsumer,
    first: BorrowedMessage<'a>,
    max_batch: usize,
    linger: Duration,
) -> Vec<BorrowedMessage<'a>> {
    let mut messages = vec![first];
    let deadline = Instant::now() + linger;
    while messages.len() < max_batch {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, consumer.recv()).await {
            Ok(Ok(message)) => messages.push(message),
            Ok(Err(e)) => {
                warn!(error = %e, "recv failed while batching");
                break;
            }
            Err(_) => break,
        }
    }
    messages
}

fn commit_batch(consumer: &StreamConsumer, messages: &[BorrowedMessage<'_>]) {
    for message in messages {
        if let Err(e) = consumer.commit_message(message, CommitMode::Async) {
            warn!(error = %e, "offset commit failed");
        }
    }
}

// ── Log ingestion ──────────────────────────────────────────────────

/// Durable subscriber to the log channel; persists entries into the log
/// store keyed by deployment id.
pub struct LogIngestor {
    consumer: StreamConsumer,
    store: StateStore,
    max_batch: usize,
    linger: Duration,
}

impl LogIngestor {
    pub fn open(config: &ChannelsConfig, store: StateStore) -> EventResult<Self> {
        let consumer = consumer_from_config(config, &config.log_topic)?;
        Ok(Self {
            consumer,
            store,
            max_batch: config.max_batch,
            linger: Duration::from_millis(config.batch_linger_ms),
        })
    }

    /// Consume until the shutdown signal flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("log ingestor running");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("log ingestor shutting down");
                    break;
                }
                received = self.consumer.recv() => {
                    match received {
                        Ok(first) => self.handle_from(first).await,
                        Err(e) => {
                            error!(error = %e, "log channel recv failed");
                            tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                        }
                    }
                }
            }
        }
    }

    async fn handle_from(&self, first: BorrowedMessage<'_>) {
        let messages = next_batch(&self.consumer, first, self.max_batch, self.linger).await;
        let (events, skipped): (Vec<LogEvent>, usize) =
            decode_payloads(messages.iter().map(|m| m.payload()));
        if skipped > 0 {
            error!(skipped, "dropped undecodable log payloads");
        }

        // Store first, commit after — the sole ordering guarantee between
        // "event observed" and "event durable".
        match self.store.append_logs(&events) {
            Ok(count) => {
                debug!(count, "log batch persisted");
                commit_batch(&self.consumer, &messages);
            }
            Err(e) => {
                // Offsets stay uncommitted; the batch is redelivered after
                // a restart. Duplicates are acceptable, loss is not.
                error!(error = %e, "log batch write failed, offsets not committed");
            }
        }
    }
}

// ── Status ingestion ───────────────────────────────────────────────

/// Durable subscriber to the status channel; advances deployment records
/// through the store's transition gate.
pub struct StatusIngestor {
    consumer: StreamConsumer,
    store: StateStore,
    max_batch: usize,
    linger: Duration,
}

impl StatusIngestor {
    pub fn open(config: &ChannelsConfig, store: StateStore) -> EventResult<Self> {
        let consumer = consumer_from_config(config, &config.status_topic)?;
        Ok(Self {
            consumer,
            store,
            max_batch: config.max_batch,
            linger: Duration::from_millis(config.batch_linger_ms),
        })
    }

    /// Consume until the shutdown signal flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("status ingestor running");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("status ingestor shutting down");
                    break;
                }
                received = self.consumer.recv() => {
                    match received {
                        Ok(first) => self.handle_from(first).await,
                        Err(e) => {
                            error!(error = %e, "status channel recv failed");
                            tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                        }
                    }
                }
            }
        }
    }

    async fn handle_from(&self, first: BorrowedMessage<'_>) {
        let messages = next_batch(&self.consumer, first, self.max_batch, self.linger).await;
        let (events, skipped): (Vec<StatusEvent>, usize) =
            decode_payloads(messages.iter().map(|m| m.payload()));
        if skipped > 0 {
            error!(skipped, "dropped undecodable status payloads");
        }

        for event in &events {
            match self.store.apply_status(event) {
                Ok(StatusApplied::Applied) => {
                    info!(
                        deployment = %event.deployment_id,
                        status = %event.status,
                        "deployment status applied"
                    );
                }
                Ok(verdict) => {
                    debug!(
                        deployment = %event.deployment_id,
                        status = %event.status,
                        ?verdict,
                        "status event skipped"
                    );
                }
                Err(e) => {
                    // Leave offsets uncommitted; the gate makes the
                    // redelivered prefix idempotent.
                    error!(error = %e, "status write failed, offsets not committed");
                    return;
                }
            }
        }
        commit_batch(&self.consumer, &messages);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loft_core::{DeploymentStatus, LogLevel};

    #[test]
    fn decode_skips_undecodable_payloads() {
        let valid = serde_json::to_vec(&LogEvent {
            deployment_id: "d-1".to_string(),
            timestamp: 1000,
            level: LogLevel::Info,
            text: "ok".to_string(),
        })
        .unwrap();
        let payloads: Vec<Option<&[u8]>> = vec![
            Some(valid.as_slice()),
            Some(b"not json".as_slice()),
            None,
            Some(valid.as_slice()),
        ];

        let (events, skipped): (Vec<LogEvent>, usize) = decode_payloads(payloads);
        assert_eq!(events.len(), 2);
        assert_eq!(skipped, 2);
    }

    #[test]
    fn decode_status_events() {
        let event = StatusEvent {
            deployment_id: "d-1".to_string(),
            status: DeploymentStatus::Ready,
            timestamp: 1000,
            url: Some("http://acme.loft.dev".to_string()),
        };
        let payload = serde_json::to_vec(&event).unwrap();
        let (events, skipped): (Vec<StatusEvent>, usize) =
            decode_payloads(vec![Some(payload.as_slice())]);
        assert_eq!(skipped, 0);
        assert_eq!(events, vec![event]);
    }

    #[tokio::test]
    async fn ingestors_open_without_broker() {
        // Client construction is lazy; no broker needs to be reachable.
        let store = StateStore::open_in_memory().unwrap();
        let config = ChannelsConfig::default();
        assert!(LogIngestor::open(&config, store.clone()).is_ok());
        assert!(StatusIngestor::open(&config, store).is_ok());
    }
}
