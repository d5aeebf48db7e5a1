//! Error types for the Loft event channels.

use thiserror::Error;

/// Result type alias for channel operations.
pub type EventResult<T> = Result<T, EventError>;

/// Errors that can occur on either end of the event channels.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("kafka client error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("event serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("spill file error: {0}")]
    Spill(#[from] std::io::Error),
}
