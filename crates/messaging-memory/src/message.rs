use bytes::Bytes;
use mqtrigger_messaging::DeliveredMessage;

/// A message delivered by the in-memory broker.
#[derive(Clone, Debug)]
pub struct MemoryMessage {
    pub(crate) durable_name: String,
    pub(crate) payload: Bytes,
    pub(crate) seq: u64,
    pub(crate) topic: String,
}

impl MemoryMessage {
    /// Position of the message in its topic log, starting at zero.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }
}

impl DeliveredMessage for MemoryMessage {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn payload(&self) -> &Bytes {
        &self.payload
    }
}
