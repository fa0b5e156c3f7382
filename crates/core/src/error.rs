use crate::trigger::FunctionReferenceKind;

use mqtrigger_messaging::SubscriptionHandlerError;
use thiserror::Error;

/// The result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A trigger definition that cannot be used as configured.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigurationError {
    /// The resolved endpoint is not a valid URL.
    #[error("invalid function endpoint: {0}")]
    InvalidEndpoint(String),

    /// The retry count is outside the accepted range.
    #[error("max retries must be between {min} and {max}, got {value}")]
    InvalidRetryCount {
        /// Smallest accepted value.
        min: u8,
        /// Largest accepted value.
        max: u8,
        /// The configured value.
        value: u8,
    },

    /// The topic name is rejected by the broker's naming rules.
    #[error("not a valid topic: {0}")]
    InvalidTopic(String),

    /// The trigger has no unique identity to derive a durable name from.
    #[error("trigger id must not be empty")]
    MissingId,

    /// The function reference kind cannot be resolved to an endpoint.
    #[error("unsupported function reference type: {0}")]
    UnsupportedFunctionReference(FunctionReferenceKind),
}

/// Errors that can occur while managing trigger subscriptions.
#[derive(Debug, Error)]
pub enum Error {
    /// Opening the durable subscription failed.
    #[error("failed to activate trigger {trigger}: {reason}")]
    Activation {
        /// The trigger id.
        trigger: String,
        /// The underlying broker error.
        reason: String,
    },

    /// A subscription for the trigger is already live.
    #[error("trigger {0} is already active")]
    AlreadyActive(String),

    /// The trigger definition is invalid.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Closing the durable subscription failed.
    #[error("failed to deactivate trigger {trigger}: {reason}")]
    Deactivation {
        /// The trigger id.
        trigger: String,
        /// The underlying broker error.
        reason: String,
    },

    /// No subscription for the trigger is live.
    #[error("trigger {0} is not active")]
    NotActive(String),
}

/// Terminal failures of a single dispatch. The message is left
/// unacknowledged and nothing is published.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DispatchError {
    /// The trigger cannot be dispatched as configured.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The outbound request could not be encoded.
    #[error("failed to build request: {0}")]
    RequestBuild(String),

    /// The function answered successfully but its body could not be read.
    #[error("failed to read response body: {0}")]
    ResponseRead(String),
}

impl SubscriptionHandlerError for DispatchError {}
