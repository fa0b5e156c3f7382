use crate::message::DeliveredMessage;

use std::error::Error;

use async_trait::async_trait;

/// Marker trait for subscription handler errors
pub trait SubscriptionHandlerError: Error + Send + Sync + 'static {}

/// A trait representing the per-message handler of a subscription.
///
/// Brokers may run `handle` concurrently for distinct messages. A returned
/// error is logged by the broker and does not end the subscription.
#[async_trait]
pub trait SubscriptionHandler<M>
where
    Self: Clone + Send + Sync + 'static,
    M: DeliveredMessage,
{
    /// The error type for the handler.
    type Error: SubscriptionHandlerError;

    /// Handles the given message. The handler owns the message for the
    /// duration of the call.
    async fn handle(&self, message: M) -> Result<(), Self::Error>;
}
