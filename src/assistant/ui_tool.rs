//! UI-tool command payloads
//!
//! The assistant invokes client-side capabilities by sending a message tagged
//! `assistantMessageType: "ui-tool"` whose body is `{"name": ..., "data": {...}}`.

use crate::client::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A validated UI-tool command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiToolInvocation {
    pub name: String,
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UiToolError {
    #[error("ui-tool message has no body")]
    MissingBody,
    #[error("invalid ui-tool payload: {0}")]
    InvalidPayload(String),
}

impl UiToolInvocation {
    pub fn parse(body: &str) -> Result<Self, UiToolError> {
        let invalid = |e: serde_json::Error| UiToolError::InvalidPayload(e.to_string());
        // Derived struct deserialization also accepts `[name, data]` arrays
        let value: Value = serde_json::from_str(body).map_err(invalid)?;
        if !value.is_object() {
            return Err(UiToolError::InvalidPayload(
                "payload must be a JSON object".to_string(),
            ));
        }
        serde_json::from_value(value).map_err(invalid)
    }

    pub fn from_message(message: &Message) -> Result<Self, UiToolError> {
        match message.body.as_deref() {
            Some(body) if !body.is_empty() => Self::parse(body),
            _ => Err(UiToolError::MissingBody),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_valid() {
        let tool = UiToolInvocation::parse(r#"{"name":"fillForm","data":{"x":1}}"#).unwrap();
        assert_eq!(tool.name, "fillForm");
        assert_eq!(Value::Object(tool.data), json!({ "x": 1 }));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let tool = UiToolInvocation::parse(r#"{"name":"a","data":{},"extra":true}"#).unwrap();
        assert_eq!(tool.name, "a");
        assert!(tool.data.is_empty());
    }

    #[test]
    fn test_schema_violations() {
        for body in [
            "not json",
            r#"{"name":"a"}"#,
            r#"{"data":{}}"#,
            r#"{"name":1,"data":{}}"#,
            r#"{"name":"a","data":[1,2]}"#,
            r#"{"name":"a","data":null}"#,
            r#"["a",{}]"#,
        ] {
            assert!(
                matches!(UiToolInvocation::parse(body), Err(UiToolError::InvalidPayload(_))),
                "expected rejection of {body}"
            );
        }
    }

    #[test]
    fn test_missing_body() {
        let mut message = Message::new("IM1", "system", "");
        assert_eq!(
            UiToolInvocation::from_message(&message),
            Err(UiToolError::MissingBody)
        );
        message.body = None;
        assert_eq!(
            UiToolInvocation::from_message(&message),
            Err(UiToolError::MissingBody)
        );
    }
}
