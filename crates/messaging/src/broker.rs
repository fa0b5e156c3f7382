use crate::message::DeliveredMessage;
use crate::subscription_handler::SubscriptionHandler;
use crate::topic::TopicValidator;

use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

/// Marker trait for broker errors
pub trait BrokerError: Error + Send + Sync + 'static {}

/// A connected broker session supporting durable, manually-acknowledged
/// subscriptions.
///
/// A single broker handle is shared by every dispatch of every subscription,
/// so `publish` and `ack` must be safe to call concurrently.
#[async_trait]
pub trait Broker
where
    Self: TopicValidator + Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the broker.
    type Error: BrokerError;

    /// The message type delivered to subscription handlers.
    type Message: DeliveredMessage;

    /// Handle to a live subscription. Consumed by `unsubscribe`.
    type Subscription: Debug + Send + Sync + 'static;

    /// Opens a durable subscription on `topic` with manual acknowledgement.
    ///
    /// `durable_name` identifies the delivery position on the broker; opening
    /// a subscription with a name used before resumes delivery of any
    /// messages that were never acknowledged.
    async fn subscribe<X>(
        &self,
        topic: &str,
        durable_name: &str,
        handler: X,
    ) -> Result<Self::Subscription, Self::Error>
    where
        X: SubscriptionHandler<Self::Message>;

    /// Closes a subscription, waiting for in-flight handler runs to finish.
    ///
    /// The durable position is left intact on the broker.
    async fn unsubscribe(&self, subscription: Self::Subscription) -> Result<(), Self::Error>;

    /// Enqueues `payload` on `topic`. Only acceptance by the broker is
    /// reported; delivery is not confirmed.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), Self::Error>;

    /// Marks `message` as consumed.
    async fn ack(&self, message: &Self::Message) -> Result<(), Self::Error>;
}
