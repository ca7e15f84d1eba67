//! OpenAI-Style Protocol Adapter
//!
//! Translates the canonical conversation model to and from the
//! `chat/completions` wire format used by OpenAI and compatible providers
//! (SiliconFlow, ZenMux, self-hosted gateways).

use serde_json::{json, Value};
use tracing::debug;

use convoke_core::adapter::{
    build_parameters_schema, ensure_well_formed, wire_messages, ProtocolAdapter,
};
use convoke_core::error::{Error, Result};
use convoke_core::types::{
    synthesize_call_id, AiResponse, FunctionCall, FunctionDefinition, Message, Role,
};
use convoke_core::Provider;

const MAX_TOKENS: u32 = 4096;

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Adapter for the `chat/completions` protocol family.
#[derive(Debug)]
pub struct OpenAiAdapter {
    provider: Provider,
    model: String,
}

impl OpenAiAdapter {
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

impl ProtocolAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    fn build_request(
        &self,
        messages: &[Message],
        tools: &[FunctionDefinition],
        _response_schema: Option<&Value>,
    ) -> Value {
        let mut wire: Vec<Value> = Vec::new();

        for msg in wire_messages(messages) {
            match msg.role {
                Role::System => {
                    wire.push(json!({ "role": "system", "content": msg.text() }));
                }
                Role::User => {
                    wire.push(json!({ "role": "user", "content": msg.text() }));
                }
                Role::Assistant => {
                    if msg.function_calls.is_empty() {
                        wire.push(json!({ "role": "assistant", "content": msg.text() }));
                    } else {
                        let calls: Vec<Value> = msg
                            .function_calls
                            .iter()
                            .map(|call| {
                                // The tool role must reference a call id, so
                                // synthesize one for providers that omit it.
                                let id = call
                                    .id
                                    .clone()
                                    .unwrap_or_else(synthesize_call_id);
                                json!({
                                    "id": id,
                                    "type": "function",
                                    "function": {
                                        "name": call.name,
                                        "arguments": call.arguments,
                                    }
                                })
                            })
                            .collect();
                        wire.push(json!({
                            "role": "assistant",
                            "content": "",
                            "tool_calls": calls,
                        }));
                    }
                }
                Role::Function => {
                    let id = msg
                        .tool_call_id
                        .clone()
                        .filter(|i| !i.is_empty())
                        .unwrap_or_else(synthesize_call_id);
                    let mut entry = json!({
                        "role": "tool",
                        "content": msg.text(),
                        "tool_call_id": id,
                    });
                    if let Some(name) = &msg.function_name {
                        entry["name"] = json!(name);
                    }
                    wire.push(entry);
                }
            }
        }

        let mut body = json!({
            "model": self.model,
            "messages": wire,
            "max_tokens": MAX_TOKENS,
        });

        // SiliconFlow gates reasoning output behind this flag.
        if self.provider == Provider::SiliconFlow {
            body["enable_thinking"] = json!(true);
        }

        if !tools.is_empty() {
            let declarations: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": build_parameters_schema(&t.parameters),
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(declarations);
            body["tool_choice"] = json!("auto");
        }

        body
    }

    fn parse_response(&self, body: &str) -> Result<AiResponse> {
        let parsed: Value = serde_json::from_str(body).map_err(|e| {
            Error::Protocol(format!(
                "invalid JSON from provider: {e}: {}",
                Error::body_snippet(body)
            ))
        })?;

        let choice = parsed
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| {
                Error::Protocol(format!(
                    "no choices in response: {}",
                    Error::body_snippet(body)
                ))
            })?;

        let message = choice.get("message").ok_or_else(|| {
            Error::Protocol(format!(
                "choice has no message: {}",
                Error::body_snippet(body)
            ))
        })?;

        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .map(|s| s.to_string());

        let mut function_calls = Vec::new();
        if let Some(calls) = message.get("tool_calls").and_then(|t| t.as_array()) {
            for call in calls {
                let function = call.get("function").unwrap_or(&Value::Null);
                function_calls.push(FunctionCall::new(
                    call.get("id").and_then(|i| i.as_str()).map(String::from),
                    function
                        .get("name")
                        .and_then(|n| n.as_str())
                        .unwrap_or(""),
                    function
                        .get("arguments")
                        .and_then(|a| a.as_str())
                        .unwrap_or("{}"),
                ));
            }
        } else if let Some(legacy) = message.get("function_call") {
            // Pre-tool-calls providers still answer with `function_call`.
            function_calls.push(FunctionCall::new(
                None,
                legacy.get("name").and_then(|n| n.as_str()).unwrap_or(""),
                legacy
                    .get("arguments")
                    .and_then(|a| a.as_str())
                    .unwrap_or("{}"),
            ));
        }

        let finish_reason = choice
            .get("finish_reason")
            .and_then(|f| f.as_str())
            .unwrap_or("stop")
            .to_string();

        debug!(calls = function_calls.len(), %finish_reason, "parsed response");

        ensure_well_formed(
            AiResponse {
                content,
                function_calls,
                finish_reason,
            },
            body,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
