//! Protocol Adapter Contract
//!
//! One adapter per provider family translates the canonical conversation
//! model to and from the provider's wire JSON. Adapters are selected once at
//! composition time and injected wherever a model call is made.

use serde_json::{json, Map, Value};

use crate::error::{Error, Result};
use crate::types::{AiResponse, FunctionDefinition, Message};

// ---------------------------------------------------------------------------
// Adapter trait
// ---------------------------------------------------------------------------

/// Request builder + response parser for one provider family.
pub trait ProtocolAdapter: Send + Sync {
    /// Provider family name (e.g. "openai", "gemini").
    fn name(&self) -> &str;

    /// Build the wire request body. `response_schema` constrains the output
    /// to a JSON shape on families that support structured output; others
    /// ignore it.
    fn build_request(
        &self,
        messages: &[Message],
        tools: &[FunctionDefinition],
        response_schema: Option<&Value>,
    ) -> Value;

    /// Parse a raw response body into the canonical response.
    fn parse_response(&self, body: &str) -> Result<AiResponse>;

    /// Whether this family honors a response-schema constraint.
    fn supports_structured_output(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Shared adapter helpers
// ---------------------------------------------------------------------------

/// Messages that belong on the wire: thinking and summary messages exist
/// only for local display/audit and are excluded from every request.
pub fn wire_messages(messages: &[Message]) -> impl Iterator<Item = &Message> {
    messages.iter().filter(|m| !m.is_thinking && !m.is_summary)
}

/// Promote a tool definition's parameters to a complete JSON Schema.
///
/// A map that already carries a `type` key is passed through verbatim.
/// Otherwise each entry is treated as a property schema, except a `required`
/// entry whose value is an array, which is promoted to the schema's
/// `required` list.
pub fn build_parameters_schema(params: &Map<String, Value>) -> Value {
    if params.is_empty() {
        return json!({ "type": "object", "properties": {} });
    }

    if params.contains_key("type") {
        return Value::Object(params.clone());
    }

    let mut properties = Map::new();
    let mut required: Vec<Value> = Vec::new();

    for (key, value) in params {
        match (key.as_str(), value) {
            ("required", Value::Array(items)) => {
                required.extend(items.iter().cloned());
            }
            (_, Value::Object(_)) => {
                properties.insert(key.clone(), value.clone());
            }
            // Non-object entries are not valid property schemas; skip them.
            _ => {}
        }
    }

    let mut schema = Map::new();
    schema.insert("type".into(), json!("object"));
    schema.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".into(), Value::Array(required));
    }
    Value::Object(schema)
}

/// Reject a parsed response that carries neither text nor tool calls.
pub fn ensure_well_formed(response: AiResponse, body: &str) -> Result<AiResponse> {
    if !response.has_content() && !response.has_function_calls() {
        return Err(Error::Protocol(format!(
            "response has neither content nor tool calls: {}",
            Error::body_snippet(body)
        )));
    }
    Ok(response)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FunctionCall, ThinkingType};

    fn flat_params() -> Map<String, Value> {
        let mut params = Map::new();
        params.insert(
            "path".into(),
            json!({ "type": "string", "description": "absolute path" }),
        );
        params.insert("recursive".into(), json!({ "type": "boolean" }));
        params.insert("required".into(), json!(["path"]));
        params
    }

    #[test]
    fn flat_map_promoted_to_object_schema() {
        let schema = build_parameters_schema(&flat_params());
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["path"]["type"], "string");
        assert_eq!(schema["properties"]["recursive"]["type"], "boolean");
        assert_eq!(schema["required"], json!(["path"]));
        assert!(schema["properties"].get("required").is_none());
    }

    #[test]
    fn complete_schema_passed_through_verbatim() {
        let mut params = Map::new();
        params.insert("type".into(), json!("object"));
        params.insert("properties".into(), json!({ "url": { "type": "string" } }));
        let schema = build_parameters_schema(&params);
        assert_eq!(schema, Value::Object(params));
    }

    #[test]
    fn empty_map_yields_empty_object_schema() {
        let schema = build_parameters_schema(&Map::new());
        assert_eq!(schema, json!({ "type": "object", "properties": {} }));
    }

    #[test]
    fn wire_messages_drops_thinking_and_summary() {
        let messages = vec![
            Message::system("prompt"),
            Message::user("hi"),
            Message::thinking("mulling", ThinkingType::Analysis),
            Message::summary("• facts"),
            Message::assistant("hello"),
        ];
        let kept: Vec<_> = wire_messages(&messages).collect();
        assert_eq!(kept.len(), 3);
        assert!(kept.iter().all(|m| !m.is_thinking && !m.is_summary));
    }

    #[test]
    fn empty_response_is_a_protocol_error() {
        let resp = AiResponse {
            content: None,
            function_calls: vec![],
            finish_reason: "stop".into(),
        };
        let err = ensure_well_formed(resp, "{}").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn response_with_calls_is_well_formed() {
        let resp = AiResponse {
            content: None,
            function_calls: vec![FunctionCall::new(None, "f", "{}")],
            finish_reason: "tool_calls".into(),
        };
        assert!(ensure_well_formed(resp, "{}").is_ok());
    }
}
