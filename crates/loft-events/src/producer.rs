//! Worker-side event publishing with bounded retry and durable spill.

use std::time::Duration;

use rdkafka::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tracing::{debug, info, warn};

use loft_core::config::ChannelsConfig;
use loft_core::{LogEvent, StatusEvent};

use crate::error::EventResult;
use crate::spill::Spill;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// How a publish call was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Published {
    /// The broker acknowledged the message.
    Sent,
    /// All attempts failed; the event was appended to the spill file for
    /// a later drain.
    Spilled,
}

/// Producer handle for the log and status channels.
///
/// Explicitly opened and passed down — one instance per worker process.
/// Publishing never fails the caller outright: after `send_retries`
/// attempts the event is spilled to disk instead, so a build is never
/// aborted by a channel outage.
pub struct EventProducer {
    inner: FutureProducer,
    log_topic: String,
    status_topic: String,
    retries: u32,
    backoff: Duration,
    spill: Spill,
}

impl EventProducer {
    /// Open a producer against the configured brokers.
    ///
    /// Connection setup is lazy; a dead broker shows up on first publish,
    /// not here.
    pub fn open(config: &ChannelsConfig) -> EventResult<Self> {
        let inner: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "5000")
            .create()?;
        let spill = Spill::new(&config.spill_dir)?;
        debug!(brokers = %config.brokers, "event producer opened");
        Ok(Self {
            inner,
            log_topic: config.log_topic.clone(),
            status_topic: config.status_topic.clone(),
            retries: config.send_retries,
            backoff: Duration::from_millis(config.send_backoff_ms),
            spill,
        })
    }

    /// Publish one build output line onto the log channel.
    pub async fn publish_log(&self, event: &LogEvent) -> EventResult<Published> {
        let payload = serde_json::to_vec(event)?;
        self.publish(&self.log_topic, &event.deployment_id, payload)
            .await
    }

    /// Publish a lifecycle transition onto the status channel.
    pub async fn publish_status(&self, event: &StatusEvent) -> EventResult<Published> {
        let payload = serde_json::to_vec(event)?;
        self.publish(&self.status_topic, &event.deployment_id, payload)
            .await
    }

    /// Re-publish any spilled backlog, oldest first.
    ///
    /// Call once after open. Events that still cannot be sent go straight
    /// back to the spill file.
    pub async fn drain_spill(&self) -> EventResult<usize> {
        let mut sent = 0;
        for topic in [self.log_topic.clone(), self.status_topic.clone()] {
            for payload in self.spill.take(&topic)? {
                match self.send_once(&topic, None, &payload).await {
                    Ok(()) => sent += 1,
                    Err(e) => {
                        warn!(%topic, error = %e, "spill drain send failed, re-spilling");
                        self.spill.append(&topic, &payload)?;
                    }
                }
            }
        }
        if sent > 0 {
            info!(count = sent, "drained spilled events");
        }
        Ok(sent)
    }

    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> EventResult<Published> {
        let mut attempt = 0u32;
        loop {
            match self.send_once(topic, Some(key), &payload).await {
                Ok(()) => return Ok(Published::Sent),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.retries {
                        warn!(
                            %topic,
                            attempts = attempt,
                            error = %e,
                            "publish failed, spilling event to disk"
                        );
                        self.spill.append(topic, &payload)?;
                        return Ok(Published::Spilled);
                    }
                    debug!(%topic, attempt, error = %e, "publish attempt failed, retrying");
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }
    }

    async fn send_once(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: &[u8],
    ) -> Result<(), rdkafka::error::KafkaError> {
        let result = match key {
            Some(key) => {
                self.inner
                    .send(
                        FutureRecord::to(topic).payload(payload).key(key),
                        Timeout::After(SEND_TIMEOUT),
                    )
                    .await
            }
            None => {
                self.inner
                    .send(
                        FutureRecord::<(), _>::to(topic).payload(payload),
                        Timeout::After(SEND_TIMEOUT),
                    )
                    .await
            }
        };
        result.map(|_| ()).map_err(|(e, _msg)| e)
    }

    /// Number of events currently parked in the spill files.
    pub fn spill_backlog(&self) -> usize {
        self.spill.backlog(&self.log_topic) + self.spill.backlog(&self.status_topic)
    }

    /// Flush outstanding deliveries. Call once before process exit.
    pub fn close(&self) -> EventResult<()> {
        self.inner.flush(Timeout::After(SEND_TIMEOUT))?;
        Ok(())
    }
}
