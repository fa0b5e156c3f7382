use mqtrigger_messaging::BrokerError;
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// Another live subscription already uses the durable name.
    #[error("durable `{0}` already has a live subscription")]
    DurableInUse(String),

    /// The durable name was first used for a different topic.
    #[error("durable `{durable_name}` is bound to topic `{topic}`")]
    DurableTopicMismatch {
        /// The durable name.
        durable_name: String,
        /// The topic the durable was created for.
        topic: String,
    },

    /// The topic name is invalid.
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// The message was delivered through a durable this broker does not know.
    #[error("unknown durable: {0}")]
    UnknownDurable(String),
}

impl BrokerError for Error {}
