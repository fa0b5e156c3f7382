use bytes::Bytes;
use mqtrigger_messaging::DeliveredMessage;

/// A message pulled from a durable `JetStream` consumer.
#[derive(Debug)]
pub struct NatsMessage {
    pub(crate) inner: async_nats::jetstream::Message,
    pub(crate) topic: String,
}

impl From<async_nats::jetstream::Message> for NatsMessage {
    fn from(inner: async_nats::jetstream::Message) -> Self {
        let topic = inner.message.subject.to_string();
        Self { inner, topic }
    }
}

impl DeliveredMessage for NatsMessage {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn payload(&self) -> &Bytes {
        &self.inner.message.payload
    }
}
