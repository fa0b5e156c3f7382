use crate::Error;

use std::collections::HashSet;
use std::path::Path;

use mqtrigger_core::TriggerSpec;
use serde::Deserialize;

/// Contents of a trigger definition file.
#[derive(Debug, Default, Deserialize)]
pub struct TriggerFile {
    /// One entry per `[[trigger]]` table.
    #[serde(default, rename = "trigger")]
    pub triggers: Vec<TriggerSpec>,
}

impl TriggerFile {
    /// Reads and parses a trigger file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::TriggerFile(format!("failed to read {}: {e}", path.display())))?;

        Self::parse(&contents)
            .map_err(|e| Error::TriggerFile(format!("failed to parse {}: {e}", path.display())))
    }

    /// Parses trigger definitions, rejecting duplicate ids.
    pub fn parse(contents: &str) -> Result<Self, String> {
        let file: Self = toml::from_str(contents).map_err(|e| e.to_string())?;

        let mut seen = HashSet::new();
        if let Some(duplicate) = file.triggers.iter().find(|t| !seen.insert(t.id.as_str())) {
            return Err(format!("duplicate trigger id {}", duplicate.id));
        }

        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mqtrigger_core::{DEFAULT_CONTENT_TYPE, FunctionReference, FunctionReferenceKind};

    #[test]
    fn test_parse_triggers() {
        let file = TriggerFile::parse(
            r#"
            [[trigger]]
            id = "5b1f6f0e-orders"
            name = "orders"
            topic = "orders"
            responseTopic = "orders-done"
            errorTopic = "orders-failed"
            maxRetries = 3
            functionReference = { type = "name", name = "process-order" }

            [[trigger]]
            id = "5b1f6f0e-invoices"
            topic = "invoices"
            contentType = "text/plain"

            [trigger.functionReference]
            type = "function-weights"
            name = "invoice-canary"
            "#,
        )
        .unwrap();

        assert_eq!(file.triggers.len(), 2);

        let orders = &file.triggers[0];
        assert_eq!(orders.response_topic(), Some("orders-done"));
        assert_eq!(orders.error_topic(), Some("orders-failed"));
        assert_eq!(orders.max_retries, 3);
        assert_eq!(orders.content_type, DEFAULT_CONTENT_TYPE);
        assert_eq!(orders.function_reference, FunctionReference::name("process-order"));

        let invoices = &file.triggers[1];
        assert_eq!(invoices.max_retries, 1);
        assert_eq!(invoices.content_type, "text/plain");
        assert_eq!(
            invoices.function_reference.kind,
            FunctionReferenceKind::FunctionWeights
        );
    }

    #[test]
    fn test_empty_file() {
        assert!(TriggerFile::parse("").unwrap().triggers.is_empty());
    }

    #[test]
    fn test_duplicate_ids() {
        let result = TriggerFile::parse(
            r#"
            [[trigger]]
            id = "a"
            topic = "orders"
            functionReference = { type = "name", name = "f" }

            [[trigger]]
            id = "a"
            topic = "invoices"
            functionReference = { type = "name", name = "g" }
            "#,
        );

        assert_eq!(result.unwrap_err(), "duplicate trigger id a");
    }

    #[test]
    fn test_missing_function_reference() {
        assert!(TriggerFile::parse("[[trigger]]\nid = \"a\"\ntopic = \"orders\"\n").is_err());
    }
}
