use crate::bridge::Bridge;
use crate::error::{ConfigurationError, Error, Result};
use crate::invoker::Invoker;
use crate::resolver::EndpointResolver;
use crate::trigger::TriggerSpec;

use std::sync::Arc;

use mqtrigger_messaging::Broker;
use tracing::info;

/// A live durable subscription for one trigger.
///
/// Consumed by [`Subscription::deactivate`], so a subscription cannot be
/// closed twice.
#[derive(Debug)]
pub struct Subscription<B>
where
    B: Broker,
{
    broker: B,
    handle: B::Subscription,
    trigger: Arc<TriggerSpec>,
}

impl<B> Subscription<B>
where
    B: Broker,
{
    /// Validates `trigger` and opens its durable subscription.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if the trigger is invalid or one of its
    /// topics is rejected by the broker. Nothing is subscribed in that case.
    /// Returns `Error::Activation` if the broker refuses the subscription.
    pub async fn activate<I, R>(bridge: &Bridge<B, I, R>, trigger: TriggerSpec) -> Result<Self>
    where
        I: Invoker,
        R: EndpointResolver,
    {
        trigger.validate()?;

        let broker = bridge.broker();
        for topic in [Some(trigger.topic.as_str()), trigger.response_topic(), trigger.error_topic()]
            .into_iter()
            .flatten()
        {
            if !broker.is_valid_topic(topic) {
                return Err(ConfigurationError::InvalidTopic(topic.to_string()).into());
            }
        }

        let trigger = Arc::new(trigger);
        let dispatcher = bridge.dispatcher(trigger.clone())?;

        let handle = broker
            .subscribe(&trigger.topic, trigger.durable_name(), dispatcher)
            .await
            .map_err(|e| Error::Activation {
                trigger: trigger.id.clone(),
                reason: e.to_string(),
            })?;

        info!(trigger = %trigger.id, topic = %trigger.topic, "trigger activated");

        Ok(Self {
            broker: broker.clone(),
            handle,
            trigger,
        })
    }

    /// Closes the subscription. Unacknowledged messages stay with the broker
    /// and are redelivered on the next activation.
    ///
    /// # Errors
    ///
    /// Returns `Error::Deactivation` if the broker fails to close it.
    pub async fn deactivate(self) -> Result<()> {
        let Self {
            broker,
            handle,
            trigger,
        } = self;

        broker
            .unsubscribe(handle)
            .await
            .map_err(|e| Error::Deactivation {
                trigger: trigger.id.clone(),
                reason: e.to_string(),
            })?;

        info!(trigger = %trigger.id, "trigger deactivated");

        Ok(())
    }

    /// The trigger this subscription serves.
    #[must_use]
    pub fn trigger(&self) -> &TriggerSpec {
        &self.trigger
    }

    /// The durable name the subscription was opened with.
    #[must_use]
    pub fn durable_name(&self) -> &str {
        self.trigger.durable_name()
    }
}
