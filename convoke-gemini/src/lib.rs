//! Gemini Protocol Adapter
//!
//! Translates the canonical conversation model to and from the Gemini
//! `generateContent` wire format: `contents` with `user`/`model` roles,
//! `systemInstruction`, `functionDeclarations`, and structured JSON output
//! via `generationConfig.responseSchema`.

use serde_json::{json, Map, Value};
use tracing::debug;

use convoke_core::adapter::{
    build_parameters_schema, ensure_well_formed, wire_messages, ProtocolAdapter,
};
use convoke_core::error::{Error, Result};
use convoke_core::types::{AiResponse, FunctionCall, FunctionDefinition, Message, Role};

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Adapter for the Gemini `generateContent` protocol family.
#[derive(Debug, Default)]
pub struct GeminiAdapter;

impl GeminiAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl ProtocolAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        "gemini"
    }

    fn build_request(
        &self,
        messages: &[Message],
        tools: &[FunctionDefinition],
        response_schema: Option<&Value>,
    ) -> Value {
        let mut contents: Vec<Value> = Vec::new();
        let mut system_instruction: Option<Value> = None;

        for msg in wire_messages(messages) {
            match msg.role {
                // Gemini has no system role in `contents`; the last system
                // message wins as the request's systemInstruction.
                Role::System => {
                    system_instruction = Some(json!({
                        "parts": [{ "text": msg.text() }]
                    }));
                }
                Role::User => {
                    contents.push(json!({
                        "role": "user",
                        "parts": [{ "text": msg.text() }]
                    }));
                }
                Role::Assistant => {
                    if msg.function_calls.is_empty() {
                        contents.push(json!({
                            "role": "model",
                            "parts": [{ "text": msg.text() }]
                        }));
                    } else {
                        let parts: Vec<Value> = msg
                            .function_calls
                            .iter()
                            .map(|call| {
                                json!({
                                    "functionCall": {
                                        "name": call.name,
                                        "args": parse_args(&call.arguments),
                                    }
                                })
                            })
                            .collect();
                        contents.push(json!({ "role": "model", "parts": parts }));
                    }
                }
                Role::Function => {
                    contents.push(json!({
                        "role": "user",
                        "parts": [{
                            "functionResponse": {
                                "name": msg.function_name.as_deref().unwrap_or(""),
                                "response": { "result": msg.text() }
                            }
                        }]
                    }));
                }
            }
        }

        let mut body = json!({ "contents": contents });

        if let Some(sys) = system_instruction {
            body["systemInstruction"] = sys;
        }

        if !tools.is_empty() {
            let declarations: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": build_parameters_schema(&t.parameters),
                    })
                })
                .collect();
            body["tools"] = json!([{ "functionDeclarations": declarations }]);
            body["toolConfig"] = json!({
                "functionCallingConfig": { "mode": "AUTO" }
            });
        }

        if let Some(schema) = response_schema {
            body["generationConfig"] = json!({
                "responseMimeType": "application/json",
                "responseSchema": schema,
            });
        }

        body
    }

    fn parse_response(&self, body: &str) -> Result<AiResponse> {
        let parsed: Value = serde_json::from_str(body).map_err(|e| {
            Error::Protocol(format!(
                "invalid JSON from Gemini: {e}: {}",
                Error::body_snippet(body)
            ))
        })?;

        let candidate = parsed
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| {
                Error::Protocol(format!(
                    "no candidates in Gemini response: {}",
                    Error::body_snippet(body)
                ))
            })?;

        let mut content = String::new();
        let mut function_calls = Vec::new();

        if let Some(parts) = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array())
        {
            for part in parts {
                if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                    content.push_str(text);
                }
                if let Some(fc) = part.get("functionCall") {
                    let name = fc
                        .get("name")
                        .and_then(|n| n.as_str())
                        .unwrap_or("")
                        .to_string();
                    let args = fc.get("args").cloned().unwrap_or_else(|| json!({}));
                    function_calls.push(FunctionCall::new(None, name, args.to_string()));
                }
            }
        }

        let finish_reason = candidate
            .get("finishReason")
            .and_then(|f| f.as_str())
            .unwrap_or("stop")
            .to_string();

        debug!(calls = function_calls.len(), %finish_reason, "parsed Gemini response");

        ensure_well_formed(
            AiResponse {
                content: if content.is_empty() {
                    None
                } else {
                    Some(content)
                },
                function_calls,
                finish_reason,
            },
            body,
        )
    }

    fn supports_structured_output(&self) -> bool {
        true
    }
}

/// Gemini wants call arguments as a JSON object, not a string. Anything
/// unparseable becomes an empty object.
fn parse_args(arguments: &str) -> Value {
    match serde_json::from_str::<Value>(arguments) {
        Ok(Value::Object(map)) => Value::Object(map),
        _ => Value::Object(Map::new()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
