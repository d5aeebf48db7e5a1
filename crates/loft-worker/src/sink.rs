//! Event emission seam for the worker pipeline.
//!
//! The pipeline stages emit through `dyn EventSink` so unit tests can
//! collect events in memory instead of standing up a broker. The
//! production sink is [`EventProducer`], whose bounded-retry-then-spill
//! behavior means emission never fails the build.

use async_trait::async_trait;
use tracing::warn;

use loft_core::{LogEvent, StatusEvent};
use loft_events::EventProducer;

/// Fire-and-forget emission of log and status events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn log(&self, event: LogEvent);
    async fn status(&self, event: StatusEvent);
}

#[async_trait]
impl EventSink for EventProducer {
    async fn log(&self, event: LogEvent) {
        if let Err(e) = self.publish_log(&event).await {
            warn!(error = %e, "log event emission failed");
        }
    }

    async fn status(&self, event: StatusEvent) {
        if let Err(e) = self.publish_status(&event).await {
            warn!(error = %e, "status event emission failed");
        }
    }
}
