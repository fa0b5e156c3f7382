use crate::error::ConfigurationError;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Smallest accepted `max_retries`.
pub const MIN_RETRIES: u8 = 1;

/// Largest accepted `max_retries`.
pub const MAX_RETRIES: u8 = 5;

/// Content type sent when a trigger does not configure one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

const fn default_max_retries() -> u8 {
    MIN_RETRIES
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

/// How a trigger names the function it invokes.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FunctionReferenceKind {
    /// A single function, by name.
    Name,

    /// A weighted set of functions.
    FunctionWeights,
}

impl fmt::Display for FunctionReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::FunctionWeights => write!(f, "function-weights"),
        }
    }
}

/// Opaque reference to the function a trigger invokes. Resolved to an
/// endpoint by an [`EndpointResolver`](crate::EndpointResolver).
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FunctionReference {
    /// The reference kind.
    #[serde(rename = "type")]
    pub kind: FunctionReferenceKind,

    /// The function name.
    pub name: String,
}

impl FunctionReference {
    /// A reference to a single function by name.
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            kind: FunctionReferenceKind::Name,
            name: name.into(),
        }
    }
}

/// Immutable definition of a message queue trigger.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSpec {
    /// Unique, stable identity. Used as the durable subscription name.
    pub id: String,

    /// Human readable name.
    #[serde(default)]
    pub name: String,

    /// Topic to subscribe to.
    pub topic: String,

    /// Topic successful responses are published to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_topic: Option<String>,

    /// Topic the last failed response is published to once retries are
    /// exhausted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_topic: Option<String>,

    /// Content type of the message payload.
    #[serde(default = "default_content_type")]
    pub content_type: String,

    /// Number of invocation attempts per message, between 1 and 5.
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,

    /// The function to invoke.
    pub function_reference: FunctionReference,
}

impl TriggerSpec {
    /// The durable subscription name, stable across restarts.
    #[must_use]
    pub fn durable_name(&self) -> &str {
        &self.id
    }

    /// The response topic, if one is configured and non-empty.
    #[must_use]
    pub fn response_topic(&self) -> Option<&str> {
        self.response_topic.as_deref().filter(|t| !t.is_empty())
    }

    /// The error topic, if one is configured and non-empty.
    #[must_use]
    pub fn error_topic(&self) -> Option<&str> {
        self.error_topic.as_deref().filter(|t| !t.is_empty())
    }

    /// Checks the parts of the definition that do not depend on the broker.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if the id is empty or `max_retries` is
    /// outside `MIN_RETRIES..=MAX_RETRIES`.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.id.is_empty() {
            return Err(ConfigurationError::MissingId);
        }

        if !(MIN_RETRIES..=MAX_RETRIES).contains(&self.max_retries) {
            return Err(ConfigurationError::InvalidRetryCount {
                min: MIN_RETRIES,
                max: MAX_RETRIES,
                value: self.max_retries,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(max_retries: u8) -> TriggerSpec {
        TriggerSpec {
            id: "0b6c1a52-1b0e-4a5e-9d59-3d7e4c1f2a10".to_string(),
            name: "orders".to_string(),
            topic: "orders".to_string(),
            response_topic: None,
            error_topic: None,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            max_retries,
            function_reference: FunctionReference::name("process-order"),
        }
    }

    #[test]
    fn test_retry_bounds() {
        for max_retries in MIN_RETRIES..=MAX_RETRIES {
            assert_eq!(trigger(max_retries).validate(), Ok(()));
        }

        assert_eq!(
            trigger(0).validate(),
            Err(ConfigurationError::InvalidRetryCount {
                min: 1,
                max: 5,
                value: 0
            })
        );
        assert!(trigger(6).validate().is_err());
    }

    #[test]
    fn test_missing_id() {
        let mut trigger = trigger(1);
        trigger.id = String::new();
        assert_eq!(trigger.validate(), Err(ConfigurationError::MissingId));
    }

    #[test]
    fn test_empty_topics_are_unset() {
        let mut trigger = trigger(1);
        trigger.response_topic = Some(String::new());
        trigger.error_topic = Some("errors".to_string());

        assert_eq!(trigger.response_topic(), None);
        assert_eq!(trigger.error_topic(), Some("errors"));
    }

    #[test]
    fn test_deserialize_defaults() {
        let trigger: TriggerSpec = serde_json::from_str(
            r#"{
                "id": "abc",
                "topic": "orders",
                "errorTopic": "orders-errors",
                "functionReference": { "type": "name", "name": "process-order" }
            }"#,
        )
        .unwrap();

        assert_eq!(trigger.max_retries, 1);
        assert_eq!(trigger.content_type, DEFAULT_CONTENT_TYPE);
        assert_eq!(trigger.response_topic(), None);
        assert_eq!(trigger.error_topic(), Some("orders-errors"));
        assert_eq!(trigger.function_reference, FunctionReference::name("process-order"));
    }

    #[test]
    fn test_deserialize_function_weights() {
        let reference: FunctionReference =
            serde_json::from_str(r#"{ "type": "function-weights", "name": "canary" }"#).unwrap();

        assert_eq!(reference.kind, FunctionReferenceKind::FunctionWeights);
        assert_eq!(reference.kind.to_string(), "function-weights");
    }
}
