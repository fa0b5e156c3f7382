use mqtrigger_messaging::BrokerError;
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Acknowledging a message failed.
    #[error("failed to ack message: {0}")]
    Ack(String),

    /// Connecting to the NATS server failed.
    #[error("failed to connect: {0}")]
    Connect(async_nats::ConnectErrorKind),

    /// Creating or looking up the durable consumer failed.
    #[error("failed to create consumer: {0}")]
    CreateConsumer(async_nats::jetstream::stream::ConsumerErrorKind),

    /// Creating the backing stream failed.
    #[error("failed to create stream: {0}")]
    CreateStream(async_nats::jetstream::context::CreateStreamErrorKind),

    /// Looking up a configured stream failed.
    #[error("failed to get stream: {0}")]
    GetStream(async_nats::jetstream::context::GetStreamErrorKind),

    /// The durable name is not usable as a consumer name.
    #[error("invalid durable name: {0}")]
    InvalidDurableName(String),

    /// The topic name is invalid for durable subscriptions.
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// Publishing failed.
    #[error("failed to publish: {0}")]
    Publish(async_nats::client::PublishErrorKind),
}

impl BrokerError for Error {}
