//! Abstract interface for the message broker a trigger subscribes to.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Brokers open durable subscriptions, publish, and acknowledge.
pub mod broker;

/// Messages delivered by a broker subscription.
pub mod message;

/// Subscription handlers process delivered messages.
pub mod subscription_handler;

/// Topic naming rules.
pub mod topic;

pub use broker::{Broker, BrokerError};
pub use message::DeliveredMessage;
pub use subscription_handler::{SubscriptionHandler, SubscriptionHandlerError};
pub use topic::{TopicValidator, is_channel_name_valid};
