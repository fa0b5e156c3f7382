//! In-memory implementation of the messaging crate.
//!
//! Every topic is an append-only log. Durables remember which positions they
//! have acknowledged, so re-subscribing with the same durable name replays
//! everything still unacknowledged before following new publishes.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod message;
mod subscription;

pub use error::Error;
pub use message::MemoryMessage;
pub use subscription::MemorySubscription;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use mqtrigger_messaging::{Broker, SubscriptionHandler, TopicValidator, is_channel_name_valid};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

const NOTIFY_CAPACITY: usize = 1024;

#[derive(Debug)]
struct TopicLog {
    messages: Vec<Bytes>,
    notifier: broadcast::Sender<u64>,
}

impl TopicLog {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            notifier: broadcast::channel(NOTIFY_CAPACITY).0,
        }
    }
}

#[derive(Debug)]
pub(crate) struct DurableState {
    acked: HashSet<u64>,
    pub(crate) live: bool,
    topic: String,
}

#[derive(Debug, Default)]
pub(crate) struct BrokerState {
    pub(crate) durables: HashMap<String, DurableState>,
    topics: HashMap<String, TopicLog>,
}

/// An in-process broker with durable, manually-acknowledged subscriptions.
#[derive(Clone, Debug, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every payload published to `topic`, in publish order.
    #[must_use]
    pub fn messages(&self, topic: &str) -> Vec<Bytes> {
        self.state
            .lock()
            .topics
            .get(topic)
            .map(|log| log.messages.clone())
            .unwrap_or_default()
    }

    /// Sequence numbers acknowledged through `durable_name`, ascending.
    #[must_use]
    pub fn acked(&self, durable_name: &str) -> Vec<u64> {
        let mut acked: Vec<u64> = self
            .state
            .lock()
            .durables
            .get(durable_name)
            .map(|durable| durable.acked.iter().copied().collect())
            .unwrap_or_default();
        acked.sort_unstable();
        acked
    }

    fn spawn_handler<X>(task_tracker: &TaskTracker, handler: &X, message: MemoryMessage)
    where
        X: SubscriptionHandler<MemoryMessage>,
    {
        let handler = handler.clone();
        task_tracker.spawn(async move {
            let topic = message.topic.clone();
            let seq = message.seq;
            if let Err(error) = handler.handle(message).await {
                warn!(%topic, seq, %error, "subscription handler failed");
            }
        });
    }
}

impl TopicValidator for MemoryBroker {
    fn is_valid_topic(&self, topic: &str) -> bool {
        is_channel_name_valid(topic, false)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    type Error = Error;
    type Message = MemoryMessage;
    type Subscription = MemorySubscription;

    async fn subscribe<X>(
        &self,
        topic: &str,
        durable_name: &str,
        handler: X,
    ) -> Result<MemorySubscription, Error>
    where
        X: SubscriptionHandler<MemoryMessage>,
    {
        if !self.is_valid_topic(topic) {
            return Err(Error::InvalidTopic(topic.to_string()));
        }

        let (backlog, mut receiver) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            let durable = state
                .durables
                .entry(durable_name.to_string())
                .or_insert_with(|| DurableState {
                    acked: HashSet::new(),
                    live: false,
                    topic: topic.to_string(),
                });

            if durable.topic != topic {
                return Err(Error::DurableTopicMismatch {
                    durable_name: durable_name.to_string(),
                    topic: durable.topic.clone(),
                });
            }
            if durable.live {
                return Err(Error::DurableInUse(durable_name.to_string()));
            }
            durable.live = true;

            let log = state
                .topics
                .entry(topic.to_string())
                .or_insert_with(TopicLog::new);

            let backlog: Vec<MemoryMessage> = (0_u64..)
                .zip(log.messages.iter())
                .filter(|(seq, _)| !durable.acked.contains(seq))
                .map(|(seq, payload)| MemoryMessage {
                    durable_name: durable_name.to_string(),
                    payload: payload.clone(),
                    seq,
                    topic: topic.to_string(),
                })
                .collect();

            (backlog, log.notifier.subscribe())
        };

        debug!(topic, durable_name, backlog = backlog.len(), "subscribed");

        let shutdown_token = CancellationToken::new();
        let task_tracker = TaskTracker::new();

        task_tracker.spawn({
            let shutdown_token = shutdown_token.clone();
            let task_tracker = task_tracker.clone();
            let state = self.state.clone();
            let topic = topic.to_string();
            let durable_name = durable_name.to_string();

            async move {
                for message in backlog {
                    Self::spawn_handler(&task_tracker, &handler, message);
                }

                loop {
                    tokio::select! {
                        biased;

                        () = shutdown_token.cancelled() => break,
                        received = receiver.recv() => match received {
                            Ok(seq) => {
                                let payload = state.lock().topics.get(&topic).and_then(|log| {
                                    usize::try_from(seq).ok().and_then(|i| log.messages.get(i).cloned())
                                });

                                if let Some(payload) = payload {
                                    Self::spawn_handler(&task_tracker, &handler, MemoryMessage {
                                        durable_name: durable_name.clone(),
                                        payload,
                                        seq,
                                        topic: topic.clone(),
                                    });
                                }
                            }
                            // Skipped messages stay unacknowledged and are replayed on the next subscribe.
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!(%topic, %durable_name, skipped, "subscription lagged");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        });

        Ok(MemorySubscription {
            durable_name: durable_name.to_string(),
            shutdown_token,
            state: self.state.clone(),
            task_tracker,
            topic: topic.to_string(),
        })
    }

    async fn unsubscribe(&self, subscription: MemorySubscription) -> Result<(), Error> {
        subscription.shutdown_token.cancel();
        subscription.task_tracker.close();
        subscription.task_tracker.wait().await;

        let mut state = self.state.lock();
        let durable = state
            .durables
            .get_mut(&subscription.durable_name)
            .ok_or_else(|| Error::UnknownDurable(subscription.durable_name.clone()))?;
        durable.live = false;
        drop(state);

        debug!(
            topic = %subscription.topic,
            durable_name = %subscription.durable_name,
            "unsubscribed"
        );

        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), Error> {
        if !self.is_valid_topic(topic) {
            return Err(Error::InvalidTopic(topic.to_string()));
        }

        let mut state = self.state.lock();
        let log = state
            .topics
            .entry(topic.to_string())
            .or_insert_with(TopicLog::new);

        let seq = log.messages.len() as u64;
        log.messages.push(payload);

        // No receivers just means nobody is subscribed yet.
        let _ = log.notifier.send(seq);

        Ok(())
    }

    async fn ack(&self, message: &MemoryMessage) -> Result<(), Error> {
        self.state
            .lock()
            .durables
            .get_mut(&message.durable_name)
            .ok_or_else(|| Error::UnknownDurable(message.durable_name.clone()))?
            .acked
            .insert(message.seq);

        Ok(())
    }
}
