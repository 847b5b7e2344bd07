mod amqp_publisher;
mod publisher;

pub use amqp_publisher::AmqpPublisher;
pub use publisher::{PublishError, ResultPublisher};
