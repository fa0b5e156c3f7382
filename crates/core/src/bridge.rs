use crate::dispatcher::Dispatcher;
use crate::error::{ConfigurationError, Result};
use crate::invoker::Invoker;
use crate::resolver::EndpointResolver;
use crate::subscription::Subscription;
use crate::trigger::{MAX_RETRIES, TriggerSpec};

use std::sync::Arc;
use std::time::Duration;

use mqtrigger_messaging::Broker;

/// Upper bound on a single invocation attempt when none is configured.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest a single dispatch can spend invoking the function: every attempt
/// waits up to `attempt_timeout` for the status and again for the body.
///
/// Brokers that redeliver unacknowledged messages after a deadline need that
/// deadline above this, or a message is redelivered while still in flight.
#[must_use]
pub fn max_dispatch_duration(attempt_timeout: Duration) -> Duration {
    attempt_timeout.saturating_mul(2 * u32::from(MAX_RETRIES))
}

/// Options for creating a `Bridge`.
#[derive(Clone, Debug)]
pub struct BridgeOptions<B, I, R> {
    /// Per-attempt timeout. Defaults to `DEFAULT_ATTEMPT_TIMEOUT`.
    pub attempt_timeout: Option<Duration>,

    /// The shared broker session.
    pub broker: B,

    /// Performs invocations.
    pub invoker: I,

    /// Resolves function references to endpoints.
    pub resolver: R,
}

/// The immutable context shared by every subscription and dispatch.
#[derive(Clone, Debug)]
pub struct Bridge<B, I, R> {
    attempt_timeout: Duration,
    broker: B,
    invoker: I,
    resolver: R,
}

impl<B, I, R> Bridge<B, I, R>
where
    B: Broker,
    I: Invoker,
    R: EndpointResolver,
{
    /// Creates a new bridge.
    pub fn new(
        BridgeOptions {
            attempt_timeout,
            broker,
            invoker,
            resolver,
        }: BridgeOptions<B, I, R>,
    ) -> Self {
        Self {
            attempt_timeout: attempt_timeout.unwrap_or(DEFAULT_ATTEMPT_TIMEOUT),
            broker,
            invoker,
            resolver,
        }
    }

    /// The shared broker session.
    pub const fn broker(&self) -> &B {
        &self.broker
    }

    /// Builds the dispatcher for `trigger`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if the trigger does not validate.
    pub fn dispatcher(
        &self,
        trigger: Arc<TriggerSpec>,
    ) -> std::result::Result<Dispatcher<B, I, R>, ConfigurationError> {
        trigger.validate()?;

        Ok(Dispatcher::new(
            self.broker.clone(),
            self.invoker.clone(),
            self.resolver.clone(),
            trigger,
            self.attempt_timeout,
        ))
    }

    /// Opens the durable subscription for `trigger`.
    ///
    /// # Errors
    ///
    /// See [`Subscription::activate`].
    pub async fn activate(&self, trigger: TriggerSpec) -> Result<Subscription<B>> {
        Subscription::activate(self, trigger).await
    }
}
