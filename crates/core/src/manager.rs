use crate::bridge::Bridge;
use crate::error::{Error, Result};
use crate::invoker::Invoker;
use crate::resolver::EndpointResolver;
use crate::subscription::Subscription;
use crate::trigger::TriggerSpec;

use std::collections::HashMap;

use async_trait::async_trait;
use mqtrigger_bootable::{BootError, Bootable};
use mqtrigger_messaging::Broker;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Keeps one live subscription per active trigger.
#[derive(Debug)]
pub struct TriggerManager<B, I, R>
where
    B: Broker,
{
    bridge: Bridge<B, I, R>,
    initial_triggers: Vec<TriggerSpec>,
    shutdown_token: CancellationToken,
    subscriptions: Mutex<HashMap<String, Subscription<B>>>,
}

impl<B, I, R> TriggerManager<B, I, R>
where
    B: Broker,
    I: Invoker,
    R: EndpointResolver,
{
    /// Creates a manager that activates `triggers` when started.
    pub fn new(bridge: Bridge<B, I, R>, triggers: Vec<TriggerSpec>) -> Self {
        Self {
            bridge,
            initial_triggers: triggers,
            shutdown_token: CancellationToken::new(),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Activates `trigger`.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadyActive` if a subscription with the same id is
    /// live, otherwise any error from [`Subscription::activate`].
    pub async fn activate(&self, trigger: TriggerSpec) -> Result<()> {
        let mut subscriptions = self.subscriptions.lock().await;

        if subscriptions.contains_key(&trigger.id) {
            return Err(Error::AlreadyActive(trigger.id));
        }

        let id = trigger.id.clone();
        let subscription = self.bridge.activate(trigger).await?;
        subscriptions.insert(id, subscription);
        drop(subscriptions);

        Ok(())
    }

    /// Deactivates the trigger with the given id.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotActive` if no subscription with that id is live,
    /// otherwise any error from [`Subscription::deactivate`].
    pub async fn deactivate(&self, id: &str) -> Result<()> {
        let subscription = self
            .subscriptions
            .lock()
            .await
            .remove(id)
            .ok_or_else(|| Error::NotActive(id.to_string()))?;

        subscription.deactivate().await
    }

    /// Replaces the definition of an active trigger. The old subscription is
    /// closed before the new one opens, so messages are never delivered to
    /// both.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotActive` if the trigger is not active. If the new
    /// definition fails to activate, the trigger is left inactive.
    pub async fn update(&self, trigger: TriggerSpec) -> Result<()> {
        let mut subscriptions = self.subscriptions.lock().await;

        let previous = subscriptions
            .remove(&trigger.id)
            .ok_or_else(|| Error::NotActive(trigger.id.clone()))?;
        previous.deactivate().await?;

        let id = trigger.id.clone();
        let subscription = self.bridge.activate(trigger).await?;
        subscriptions.insert(id, subscription);
        drop(subscriptions);

        Ok(())
    }

    /// Ids of the currently active triggers, sorted.
    pub async fn active_triggers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.subscriptions.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl<B, I, R> Bootable for TriggerManager<B, I, R>
where
    B: Broker,
    I: Invoker,
    R: EndpointResolver,
{
    fn name(&self) -> &str {
        "trigger-manager"
    }

    /// Activates every configured trigger. A trigger that fails to activate
    /// is logged and skipped.
    async fn start(&self) -> std::result::Result<(), BootError> {
        info!(triggers = self.initial_triggers.len(), "starting trigger manager...");

        for trigger in &self.initial_triggers {
            let id = trigger.id.clone();
            if let Err(e) = self.activate(trigger.clone()).await {
                error!(trigger = %id, error = %e, "failed to activate trigger");
            }
        }

        let active = self.subscriptions.lock().await.len();
        info!(active, "trigger manager started");

        Ok(())
    }

    /// Deactivates every trigger, waiting for in-flight dispatches.
    async fn shutdown(&self) -> std::result::Result<(), BootError> {
        info!("trigger manager shutting down...");

        let subscriptions: Vec<Subscription<B>> = self
            .subscriptions
            .lock()
            .await
            .drain()
            .map(|(_, subscription)| subscription)
            .collect();

        for subscription in subscriptions {
            if let Err(e) = subscription.deactivate().await {
                warn!(error = %e, "failed to deactivate trigger");
            }
        }

        self.shutdown_token.cancel();

        info!("trigger manager shutdown");

        Ok(())
    }

    async fn wait(&self) {
        self.shutdown_token.cancelled().await;
    }
}
