//! NATS `JetStream` implementation of the messaging crate.
//!
//! Durable subscriptions are pull consumers with explicit acknowledgement.
//! Unsubscribing only stops pulling: the consumer stays on the server so a
//! later subscribe with the same durable name picks up every message that was
//! never acknowledged.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod message;
mod subscription;

pub use error::Error;
pub use message::NatsMessage;
pub use subscription::NatsSubscription;

use std::time::Duration;

use async_nats::Client;
use async_nats::jetstream::Context as JetStreamContext;
use async_nats::jetstream::consumer::pull::Config as PullConfig;
use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy, PullConsumer};
use async_nats::jetstream::stream::{Config as StreamConfig, Stream};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use mqtrigger_messaging::{Broker, SubscriptionHandler, TopicValidator, is_channel_name_valid};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Prefix for streams created on demand for a topic.
pub const DEFAULT_STREAM_PREFIX: &str = "MQTRIGGER_";

/// How long the server waits for an ack before redelivering, when not
/// configured.
pub const DEFAULT_ACK_WAIT: Duration = Duration::from_secs(30);

const MESSAGES_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Options for connecting a `NatsBroker`.
#[derive(Clone, Debug)]
pub struct NatsBrokerOptions {
    /// Redelivery deadline for unacknowledged messages on durable consumers
    /// created by this broker. Defaults to `DEFAULT_ACK_WAIT`; must exceed
    /// the longest time a handler may take.
    pub ack_wait: Option<Duration>,

    /// Connection name reported to the server.
    pub client_name: Option<String>,

    /// Existing stream that captures every subscribed topic. When unset, one
    /// stream per topic is created on demand.
    pub stream_name: Option<String>,

    /// Prefix for streams created on demand.
    pub stream_prefix: String,

    /// NATS server URL, e.g. `nats://localhost:4222`.
    pub url: String,
}

/// A broker session backed by NATS `JetStream`.
#[derive(Clone, Debug)]
pub struct NatsBroker {
    ack_wait: Duration,
    client: Client,
    jetstream_context: JetStreamContext,
    stream_name: Option<String>,
    stream_prefix: String,
}

impl NatsBroker {
    /// Connects to the NATS server.
    ///
    /// # Errors
    ///
    /// Returns `Error::Connect` if the server cannot be reached.
    pub async fn connect(
        NatsBrokerOptions {
            ack_wait,
            client_name,
            stream_name,
            stream_prefix,
            url,
        }: NatsBrokerOptions,
    ) -> Result<Self, Error> {
        let mut connect_options = async_nats::ConnectOptions::new();
        if let Some(client_name) = client_name {
            connect_options = connect_options.name(&client_name);
        }

        let client = connect_options
            .connect(url.as_str())
            .await
            .map_err(|e| Error::Connect(e.kind()))?;

        info!(%url, "connected to nats");

        Ok(Self::from_client(client, stream_name, stream_prefix)
            .with_ack_wait(ack_wait.unwrap_or(DEFAULT_ACK_WAIT)))
    }

    /// Wraps an already connected client.
    #[must_use]
    pub fn from_client(client: Client, stream_name: Option<String>, stream_prefix: String) -> Self {
        let jetstream_context = async_nats::jetstream::new(client.clone());

        Self {
            ack_wait: DEFAULT_ACK_WAIT,
            client,
            jetstream_context,
            stream_name,
            stream_prefix,
        }
    }

    /// Overrides the redelivery deadline for consumers created afterwards.
    #[must_use]
    pub fn with_ack_wait(mut self, ack_wait: Duration) -> Self {
        self.ack_wait = ack_wait;
        self
    }

    async fn stream_for(&self, topic: &str) -> Result<Stream, Error> {
        if let Some(stream_name) = &self.stream_name {
            return self
                .jetstream_context
                .get_stream(stream_name)
                .await
                .map_err(|e| Error::GetStream(e.kind()));
        }

        self.jetstream_context
            .get_or_create_stream(StreamConfig {
                name: stream_name_for_topic(&self.stream_prefix, topic),
                subjects: vec![topic.to_string()],
                ..Default::default()
            })
            .await
            .map_err(|e| Error::CreateStream(e.kind()))
    }

    async fn read_messages<X>(
        consumer: PullConsumer,
        handler: X,
        shutdown_token: CancellationToken,
        task_tracker: TaskTracker,
    ) where
        X: SubscriptionHandler<NatsMessage>,
    {
        loop {
            let mut messages = match consumer.messages().await {
                Ok(messages) => messages,
                Err(error) => {
                    warn!(%error, "failed to open consumer message stream");
                    if shutdown_token
                        .run_until_cancelled(tokio::time::sleep(MESSAGES_RETRY_DELAY))
                        .await
                        .is_none()
                    {
                        return;
                    }
                    continue;
                }
            };

            loop {
                tokio::select! {
                    () = shutdown_token.cancelled() => return,
                    next = messages.next() => match next {
                        Some(Ok(message)) => {
                            let message = NatsMessage::from(message);
                            let handler = handler.clone();
                            task_tracker.spawn(async move {
                                let topic = message.topic.clone();
                                if let Err(error) = handler.handle(message).await {
                                    warn!(%topic, %error, "subscription handler failed");
                                }
                            });
                        }
                        Some(Err(error)) => {
                            warn!(%error, "error receiving from consumer");
                        }
                        None => break,
                    }
                }
            }
        }
    }
}

/// Durable pull consumer following `topic` with explicit acks.
fn consumer_config(topic: &str, durable_name: &str, ack_wait: Duration) -> PullConfig {
    PullConfig {
        durable_name: Some(durable_name.to_string()),
        filter_subject: topic.to_string(),
        ack_policy: AckPolicy::Explicit,
        ack_wait,
        deliver_policy: DeliverPolicy::All,
        ..Default::default()
    }
}

/// Maps a topic to a stream name (`.`, `/`, and `\` are not allowed there).
fn stream_name_for_topic(prefix: &str, topic: &str) -> String {
    let suffix: String = topic
        .chars()
        .map(|c| match c {
            '.' | '/' | '\\' => '_',
            c => c,
        })
        .collect();

    format!("{prefix}{suffix}")
}

fn is_durable_name_valid(durable_name: &str) -> bool {
    !durable_name.is_empty()
        && !durable_name
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '.' | '*' | '>' | '/' | '\\'))
}

impl TopicValidator for NatsBroker {
    /// `JetStream` consumers cannot durably follow wildcard subjects here.
    fn is_valid_topic(&self, topic: &str) -> bool {
        is_channel_name_valid(topic, false)
    }
}

#[async_trait]
impl Broker for NatsBroker {
    type Error = Error;
    type Message = NatsMessage;
    type Subscription = NatsSubscription;

    async fn subscribe<X>(
        &self,
        topic: &str,
        durable_name: &str,
        handler: X,
    ) -> Result<NatsSubscription, Error>
    where
        X: SubscriptionHandler<NatsMessage>,
    {
        if !self.is_valid_topic(topic) {
            return Err(Error::InvalidTopic(topic.to_string()));
        }
        if !is_durable_name_valid(durable_name) {
            return Err(Error::InvalidDurableName(durable_name.to_string()));
        }

        let stream = self.stream_for(topic).await?;

        let consumer: PullConsumer = stream
            .get_or_create_consumer(
                durable_name,
                consumer_config(topic, durable_name, self.ack_wait),
            )
            .await
            .map_err(|e| Error::CreateConsumer(e.kind()))?;

        debug!(topic, durable_name, ack_wait = ?self.ack_wait, "durable consumer ready");

        let shutdown_token = CancellationToken::new();
        let task_tracker = TaskTracker::new();

        task_tracker.spawn(Self::read_messages(
            consumer,
            handler,
            shutdown_token.clone(),
            task_tracker.clone(),
        ));

        Ok(NatsSubscription {
            durable_name: durable_name.to_string(),
            shutdown_token,
            task_tracker,
            topic: topic.to_string(),
        })
    }

    async fn unsubscribe(&self, subscription: NatsSubscription) -> Result<(), Error> {
        subscription.shutdown_token.cancel();
        subscription.task_tracker.close();
        subscription.task_tracker.wait().await;

        debug!(
            topic = %subscription.topic,
            durable_name = %subscription.durable_name,
            "unsubscribed"
        );

        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), Error> {
        self.client
            .publish(topic.to_string(), payload)
            .await
            .map_err(|e| Error::Publish(e.kind()))
    }

    async fn ack(&self, message: &NatsMessage) -> Result<(), Error> {
        message
            .inner
            .ack()
            .await
            .map_err(|e| Error::Ack(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::error::Error as StdError;

    use mqtrigger_messaging::{DeliveredMessage, SubscriptionHandlerError};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[test]
    fn test_stream_name_for_topic() {
        assert_eq!(
            stream_name_for_topic(DEFAULT_STREAM_PREFIX, "orders.created"),
            "MQTRIGGER_orders_created"
        );
        assert_eq!(stream_name_for_topic("", "orders"), "orders");
    }

    #[test]
    fn test_consumer_config() {
        let config = consumer_config("orders", "trigger-1", Duration::from_secs(120));

        assert_eq!(config.durable_name.as_deref(), Some("trigger-1"));
        assert_eq!(config.filter_subject, "orders");
        assert_eq!(config.ack_policy, AckPolicy::Explicit);
        assert_eq!(config.ack_wait, Duration::from_secs(120));
    }

    #[test]
    fn test_durable_name_validation() {
        assert!(is_durable_name_valid("3f2504e0-4f89-11d3-9a0c-0305e82c3301"));
        assert!(!is_durable_name_valid(""));
        assert!(!is_durable_name_valid("orders.durable"));
        assert!(!is_durable_name_valid("orders durable"));
        assert!(!is_durable_name_valid("orders*"));
    }

    #[derive(Clone, Debug)]
    struct TestHandler {
        broker: NatsBroker,
        sender: mpsc::Sender<Bytes>,
    }

    #[derive(Debug, Clone)]
    struct TestHandlerError;

    impl std::fmt::Display for TestHandlerError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestHandlerError")
        }
    }

    impl StdError for TestHandlerError {}

    impl SubscriptionHandlerError for TestHandlerError {}

    #[async_trait]
    impl SubscriptionHandler<NatsMessage> for TestHandler {
        type Error = TestHandlerError;

        async fn handle(&self, message: NatsMessage) -> Result<(), Self::Error> {
            self.broker
                .ack(&message)
                .await
                .map_err(|_| TestHandlerError)?;
            self.sender
                .send(message.payload().clone())
                .await
                .map_err(|_| TestHandlerError)
        }
    }

    #[tokio::test]
    #[ignore = "requires a JetStream-enabled NATS server on localhost:4222"]
    async fn test_durable_subscription() {
        let broker = NatsBroker::connect(NatsBrokerOptions {
            ack_wait: None,
            client_name: Some("mqtrigger-test".to_string()),
            stream_name: None,
            stream_prefix: DEFAULT_STREAM_PREFIX.to_string(),
            url: "nats://localhost:4222".to_string(),
        })
        .await
        .unwrap();

        let topic = "mqtrigger-test.orders";
        let (sender, mut receiver) = mpsc::channel(10);
        let subscription = broker
            .subscribe(
                topic,
                "mqtrigger-test-durable",
                TestHandler {
                    broker: broker.clone(),
                    sender,
                },
            )
            .await
            .unwrap();

        broker.publish(topic, Bytes::from("message1")).await.unwrap();

        assert_eq!(
            timeout(Duration::from_secs(5), receiver.recv())
                .await
                .unwrap()
                .unwrap(),
            Bytes::from("message1")
        );

        broker.unsubscribe(subscription).await.unwrap();
    }
}
