use crate::error::DispatchError;
use crate::invoker::{InvocationRequest, InvokeError, Invoker, ResponseBody};
use crate::resolver::EndpointResolver;
use crate::trigger::TriggerSpec;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use mqtrigger_messaging::{Broker, DeliveredMessage, SubscriptionHandler};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Header carrying the topic the message was received on.
pub const TOPIC_HEADER: &str = "X-MQTrigger-Topic";

/// Header carrying the trigger's response topic (empty if unset).
pub const RESPONSE_TOPIC_HEADER: &str = "X-MQTrigger-RespTopic";

/// Header carrying the trigger's error topic (empty if unset).
pub const ERROR_TOPIC_HEADER: &str = "X-MQTrigger-ErrorTopic";

/// The result of invoking the function for one message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InvocationOutcome {
    /// Number of attempts made.
    pub attempts: u8,

    /// Body of the successful response, or of the last failed attempt.
    pub body: Option<Bytes>,

    /// Error of the last failed attempt.
    pub last_error: Option<String>,

    /// Status of the successful response, or of the last failed attempt.
    pub status: Option<StatusCode>,

    /// Whether an attempt succeeded.
    pub succeeded: bool,
}

#[derive(Debug, Default)]
struct AttemptFailure {
    body: Option<Bytes>,
    error: String,
    status: Option<StatusCode>,
}

enum Attempt {
    Succeeded {
        body: ResponseBody,
        status: StatusCode,
    },
    Failed(AttemptFailure),
}

/// Handles every message delivered for one trigger. Holds only read-only
/// state, so distinct messages dispatch concurrently.
#[derive(Clone, Debug)]
pub struct Dispatcher<B, I, R> {
    attempt_timeout: Duration,
    broker: B,
    invoker: I,
    resolver: R,
    trigger: Arc<TriggerSpec>,
}

impl<B, I, R> Dispatcher<B, I, R>
where
    B: Broker,
    I: Invoker,
    R: EndpointResolver,
{
    pub(crate) const fn new(
        broker: B,
        invoker: I,
        resolver: R,
        trigger: Arc<TriggerSpec>,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            attempt_timeout,
            broker,
            invoker,
            resolver,
            trigger,
        }
    }

    /// The trigger this dispatcher serves.
    #[must_use]
    pub fn trigger(&self) -> &TriggerSpec {
        &self.trigger
    }

    /// Runs one message through invocation, acknowledgement, and fan-out.
    ///
    /// On success the message is acknowledged and then, if configured, the
    /// response body is published to the response topic. Once every attempt
    /// has failed the message is left unacknowledged and, if configured, the
    /// last observed body is published to the error topic. Acknowledge and
    /// publish failures are logged only.
    ///
    /// # Errors
    ///
    /// Returns a `DispatchError` if the function reference cannot be resolved,
    /// the request cannot be built, or a successful response body cannot be
    /// read. The message is not acknowledged in any of these cases.
    #[instrument(skip(self, message), fields(trigger = %self.trigger.id, topic = %message.topic()))]
    pub async fn dispatch(&self, message: B::Message) -> Result<InvocationOutcome, DispatchError> {
        let url = self
            .resolver
            .resolve(&self.trigger.function_reference)
            .inspect_err(|e| error!(error = %e, "cannot resolve function endpoint"))?;

        let request = self
            .build_request(url, message.payload().clone())
            .inspect_err(|e| error!(error = %e, "cannot build request"))?;

        debug!(url = %request.url, "invoking function");

        let outcome = self
            .invoke(&request)
            .await
            .inspect_err(|e| warn!(error = %e, "response unreadable, leaving message unacknowledged"))?;

        if outcome.succeeded {
            self.complete(&message, &outcome).await;
        } else {
            self.exhaust(&outcome).await;
        }

        Ok(outcome)
    }

    /// Builds the outbound request carrying `payload` and the trigger's
    /// routing headers.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::RequestBuild` if a header value cannot be
    /// encoded.
    pub fn build_request(&self, url: Url, payload: Bytes) -> Result<InvocationRequest, DispatchError> {
        let trigger = &self.trigger;
        let mut headers = HeaderMap::with_capacity(4);

        for (name, value) in [
            (TOPIC_HEADER, trigger.topic.as_str()),
            (RESPONSE_TOPIC_HEADER, trigger.response_topic().unwrap_or_default()),
            (ERROR_TOPIC_HEADER, trigger.error_topic().unwrap_or_default()),
        ] {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| DispatchError::RequestBuild(format!("{name}: {e}")))?;
            headers.insert(name, header_value(value)?);
        }
        headers.insert(CONTENT_TYPE, header_value(&trigger.content_type)?);

        Ok(InvocationRequest {
            body: payload,
            headers,
            url,
        })
    }

    /// Issues `request` up to `max_retries` times, stopping at the first
    /// success.
    async fn invoke(&self, request: &InvocationRequest) -> Result<InvocationOutcome, DispatchError> {
        let max_attempts = self.trigger.max_retries;
        let mut last_failure = AttemptFailure::default();

        for attempt in 1..=max_attempts {
            match self.attempt(request).await {
                Attempt::Succeeded { body, status } => {
                    let body = self.read_success_body(body).await?;
                    debug!(attempt, %status, "invocation succeeded");

                    return Ok(InvocationOutcome {
                        attempts: attempt,
                        body: Some(body),
                        last_error: None,
                        status: Some(status),
                        succeeded: true,
                    });
                }
                Attempt::Failed(failure) => {
                    warn!(
                        attempt,
                        max_attempts,
                        status = ?failure.status,
                        error = %failure.error,
                        "invocation attempt failed"
                    );
                    last_failure = failure;
                }
            }
        }

        Ok(InvocationOutcome {
            attempts: max_attempts,
            body: last_failure.body,
            last_error: Some(last_failure.error),
            status: last_failure.status,
            succeeded: false,
        })
    }

    /// Sends one attempt. The timeout bounds the wait for the status; a
    /// 200 body is read separately so a slow body never causes a retry.
    async fn attempt(&self, request: &InvocationRequest) -> Attempt {
        let response =
            match tokio::time::timeout(self.attempt_timeout, self.invoker.invoke(request)).await {
                Err(_) => {
                    return Attempt::Failed(AttemptFailure {
                        body: None,
                        error: InvokeError::Timeout(self.attempt_timeout).to_string(),
                        status: None,
                    });
                }
                Ok(Err(e)) => {
                    return Attempt::Failed(AttemptFailure {
                        body: None,
                        error: e.to_string(),
                        status: None,
                    });
                }
                Ok(Ok(response)) => response,
            };

        if response.status == StatusCode::OK {
            return Attempt::Succeeded {
                body: response.body,
                status: response.status,
            };
        }

        // A failed attempt's body is only reported, so losing it is not an error.
        let body = match tokio::time::timeout(self.attempt_timeout, response.body).await {
            Ok(Ok(body)) => Some(body),
            Ok(Err(error)) => {
                debug!(%error, "failed to read error response body");
                None
            }
            Err(_) => None,
        };

        Attempt::Failed(AttemptFailure {
            body,
            error: format!("unexpected status {}", response.status),
            status: Some(response.status),
        })
    }

    async fn read_success_body(&self, body: ResponseBody) -> Result<Bytes, DispatchError> {
        match tokio::time::timeout(self.attempt_timeout, body).await {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(error)) => Err(DispatchError::ResponseRead(error)),
            Err(_) => Err(DispatchError::ResponseRead(format!(
                "body not received within {:?}",
                self.attempt_timeout
            ))),
        }
    }

    // The ack always precedes the response publish.
    async fn complete(&self, message: &B::Message, outcome: &InvocationOutcome) {
        if let Err(e) = self.broker.ack(message).await {
            warn!(error = %e, "failed to ack message");
        }

        if let Some(response_topic) = self.trigger.response_topic() {
            let body = outcome.body.clone().unwrap_or_default();
            if let Err(e) = self.broker.publish(response_topic, body).await {
                warn!(%response_topic, error = %e, "failed to publish response");
            }
        }
    }

    async fn exhaust(&self, outcome: &InvocationOutcome) {
        error!(
            attempts = outcome.attempts,
            status = ?outcome.status,
            error = outcome.last_error.as_deref().unwrap_or_default(),
            "invocation failed after all attempts"
        );

        let Some(error_topic) = self.trigger.error_topic() else {
            return;
        };

        info!(%error_topic, "publishing last response to error topic");

        let body = outcome.body.clone().unwrap_or_default();
        if let Err(e) = self.broker.publish(error_topic, body).await {
            warn!(%error_topic, error = %e, "failed to publish to error topic");
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue, DispatchError> {
    HeaderValue::from_str(value)
        .map_err(|e| DispatchError::RequestBuild(format!("invalid header value {value:?}: {e}")))
}

#[async_trait]
impl<B, I, R> SubscriptionHandler<B::Message> for Dispatcher<B, I, R>
where
    B: Broker,
    I: Invoker,
    R: EndpointResolver,
{
    type Error = DispatchError;

    async fn handle(&self, message: B::Message) -> Result<(), Self::Error> {
        self.dispatch(message).await.map(|_| ())
    }
}
