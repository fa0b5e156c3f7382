use std::fmt::Debug;

use bytes::Bytes;

/// A message delivered on a subscription, together with whatever the broker
/// needs to acknowledge it later.
pub trait DeliveredMessage
where
    Self: Debug + Send + Sync + 'static,
{
    /// The topic the message was published to.
    fn topic(&self) -> &str;

    /// The raw payload.
    fn payload(&self) -> &Bytes;
}
