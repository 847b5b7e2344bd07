use std::time::Duration;

use async_trait::async_trait;
use shared::TaskResult;

/// Infrastructure failures while recording a task outcome on the broker.
/// These are never folded into a task's own `error` status.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Timed out connecting to RabbitMQ after {0:?}")]
    ConnectTimeout(Duration),
    #[error("Failed to connect to RabbitMQ: {0}")]
    Connect(#[source] lapin::Error),
    #[error("Failed to open RabbitMQ channel: {0}")]
    Channel(#[source] lapin::Error),
    #[error("Failed to declare result queue: {0}")]
    Declare(#[source] lapin::Error),
    #[error("Failed to publish task result: {0}")]
    Publish(#[source] lapin::Error),
    #[error("RabbitMQ rejected the task result")]
    Nacked,
    #[error("RabbitMQ did not confirm the task result")]
    Unconfirmed,
    #[error("Failed to serialize task result: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait ResultPublisher: Send + Sync {
    /// Records one task outcome. Returns only after the broker accepted or
    /// definitively rejected the message.
    async fn publish(&self, result: &TaskResult) -> Result<(), PublishError>;
}
