use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, BasicQosOptions, ConfirmSelectOptions, QueueDeclareOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use log::{debug, warn};
use shared::{TaskResult, RESULT_QUEUE};

use super::publisher::{PublishError, ResultPublisher};
use crate::config::BrokerConfig;

const PERSISTENT: u8 = 2;
const REPLY_SUCCESS: u16 = 200;

/// Publishes every task outcome over a fresh broker connection. A broken
/// connection therefore only ever affects the task that opened it.
#[derive(Debug, Clone)]
pub struct AmqpPublisher {
    config: BrokerConfig,
}

impl AmqpPublisher {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ResultPublisher for AmqpPublisher {
    async fn publish(&self, result: &TaskResult) -> Result<(), PublishError> {
        let body = encode_message(result)?;
        let session = BrokerSession::open(&self.config).await?;
        publish_and_close(session, &body).await?;
        debug!("Published result of task {} to {}", result.task_id, RESULT_QUEUE);
        Ok(())
    }
}

/// An opened broker session. `close` never fails, so release happens on
/// every path through `publish_and_close`.
#[async_trait]
trait PublishSession: Send {
    async fn publish(&self, body: &[u8]) -> Result<(), PublishError>;
    async fn close(self);
}

async fn publish_and_close<S: PublishSession>(session: S, body: &[u8]) -> Result<(), PublishError> {
    let outcome = session.publish(body).await;
    session.close().await;
    outcome
}

/// One connection plus one channel in publisher-confirm mode.
struct BrokerSession {
    connection: Connection,
    channel: Channel,
}

impl BrokerSession {
    async fn open(config: &BrokerConfig) -> Result<Self, PublishError> {
        let url = config.url();
        let connect = Connection::connect(&url, ConnectionProperties::default());
        let connection = tokio::time::timeout(config.connect_timeout, connect)
            .await
            .map_err(|_| PublishError::ConnectTimeout(config.connect_timeout))?
            .map_err(PublishError::Connect)?;

        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                close_connection(&connection).await;
                return Err(PublishError::Channel(e));
            }
        };

        let session = Self { connection, channel };
        if let Err(e) = session.configure_channel().await {
            session.close().await;
            return Err(PublishError::Channel(e));
        }
        Ok(session)
    }

    async fn configure_channel(&self) -> Result<(), lapin::Error> {
        self.channel.basic_qos(1, BasicQosOptions::default()).await?;
        // Confirm mode makes the broker ack or nack every publish.
        self.channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
    }
}

#[async_trait]
impl PublishSession for BrokerSession {
    async fn publish(&self, body: &[u8]) -> Result<(), PublishError> {
        let queue = self
            .channel
            .queue_declare(
                RESULT_QUEUE,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(PublishError::Declare)?;

        let confirm = self
            .channel
            .basic_publish(
                "",
                queue.name().as_str(),
                BasicPublishOptions::default(),
                body,
                message_properties(),
            )
            .await
            .map_err(PublishError::Publish)?;
        check_confirmation(confirm.await.map_err(PublishError::Publish)?)
    }

    async fn close(self) {
        if let Err(e) = self.channel.close(REPLY_SUCCESS, "OK").await {
            warn!("Error closing RabbitMQ channel: {}", e);
        }
        close_connection(&self.connection).await;
    }
}

async fn close_connection(connection: &Connection) {
    if let Err(e) = connection.close(REPLY_SUCCESS, "OK").await {
        warn!("Error closing RabbitMQ connection: {}", e);
    }
}

fn check_confirmation(confirmation: Confirmation) -> Result<(), PublishError> {
    match confirmation {
        Confirmation::Ack(_) => Ok(()),
        Confirmation::Nack(_) => Err(PublishError::Nacked),
        Confirmation::NotRequested => Err(PublishError::Unconfirmed),
    }
}

fn message_properties() -> BasicProperties {
    BasicProperties::default()
        .with_content_type("application/json".into())
        .with_delivery_mode(PERSISTENT)
}

fn encode_message(result: &TaskResult) -> Result<Vec<u8>, PublishError> {
    Ok(serde_json::to_vec(result)?)
}
