//! Core Data Types
//!
//! Canonical conversation model shared by the adapters, registry, and
//! orchestration loop: messages, roles, function calls/results, and the
//! provider-agnostic model response.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Roles and thinking categories
// ---------------------------------------------------------------------------

/// Message role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    /// A tool/function result turn. Maps to wire role `tool` (OpenAI) or a
    /// `functionResponse` part (Gemini).
    Function,
}

/// Category tag for a thinking-status message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingType {
    Analysis,
    FunctionCall,
    Execution,
    CodeGeneration,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A message in the conversation.
///
/// Messages are immutable once appended; the orchestration loop only ever
/// appends new entries in causal order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id.
    pub id: String,
    pub role: Role,
    /// Text content. `None` for pure tool-call turns.
    pub content: Option<String>,
    /// Tool calls carried by an assistant turn. Non-empty only for
    /// `Role::Assistant`.
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
    /// Name of the function that produced a `Role::Function` message.
    pub function_name: Option<String>,
    /// Correlates a `Role::Function` message to the call that produced it.
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    /// Local thinking-status message; never sent over the wire.
    #[serde(default)]
    pub is_thinking: bool,
    /// Context-summary message; never sent over the wire.
    #[serde(default)]
    pub is_summary: bool,
    pub thinking_type: Option<ThinkingType>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn base(role: Role, content: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
            function_calls: Vec::new(),
            function_name: None,
            tool_call_id: None,
            is_error: false,
            is_thinking: false,
            is_summary: false,
            thinking_type: None,
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::base(Role::User, Some(content.into()))
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::base(Role::Assistant, Some(content.into()))
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::base(Role::System, Some(content.into()))
    }

    /// Assistant turn carrying a single tool call and no text.
    pub fn tool_call(call: FunctionCall) -> Self {
        let mut msg = Self::base(Role::Assistant, Some(String::new()));
        msg.function_calls = vec![call];
        msg
    }

    /// Result turn for an executed function.
    pub fn function_result(
        function_name: impl Into<String>,
        content: impl Into<String>,
        tool_call_id: Option<String>,
    ) -> Self {
        let mut msg = Self::base(Role::Function, Some(content.into()));
        msg.function_name = Some(function_name.into());
        msg.tool_call_id = tool_call_id;
        msg
    }

    pub fn error(content: impl Into<String>) -> Self {
        let mut msg = Self::assistant(content);
        msg.is_error = true;
        msg
    }

    pub fn thinking(content: impl Into<String>, thinking_type: ThinkingType) -> Self {
        let mut msg = Self::assistant(content);
        msg.is_thinking = true;
        msg.thinking_type = Some(thinking_type);
        msg
    }

    pub fn summary(content: impl Into<String>) -> Self {
        let mut msg = Self::assistant(content);
        msg.is_summary = true;
        msg
    }

    /// Whether this message belongs in a wire request: not a system turn and
    /// not a local thinking/summary artifact.
    pub fn is_conversational(&self) -> bool {
        self.role != Role::System && !self.is_thinking && !self.is_summary
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// Function calls, definitions, results
// ---------------------------------------------------------------------------

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionCall {
    /// Provider-assigned call id. Absent for providers without explicit ids
    /// (Gemini); synthesized by the adapters when a wire format needs one.
    pub id: Option<String>,
    pub name: String,
    /// Opaque JSON object string. The core never introspects it.
    pub arguments: String,
}

impl FunctionCall {
    pub fn new(id: Option<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(1);

/// Synthesize a unique call id for providers that omitted one.
pub fn synthesize_call_id() -> String {
    format!("call_{}", NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed))
}

/// A tool definition advertised to the model.
///
/// `parameters` is either a complete JSON Schema (contains a `type` key) or a
/// flat property→schema map that the adapters promote to a full object
/// schema before sending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl FunctionDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::Map::new(),
        }
    }
}

/// Result of executing a tool call. Exactly one of `result`/`error` is
/// meaningful, gated by `success`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionResult {
    pub function_call_id: Option<String>,
    pub success: bool,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl FunctionResult {
    pub fn ok(function_call_id: Option<String>, result: impl Into<String>) -> Self {
        Self {
            function_call_id,
            success: true,
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn err(function_call_id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            function_call_id,
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Canonical model response
// ---------------------------------------------------------------------------

/// Provider-agnostic response from one model call.
#[derive(Debug, Clone)]
pub struct AiResponse {
    pub content: Option<String>,
    pub function_calls: Vec<FunctionCall>,
    /// Provider-supplied finish reason (e.g. "stop", "tool_calls").
    pub finish_reason: String,
}

impl AiResponse {
    pub fn has_content(&self) -> bool {
        self.content
            .as_deref()
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn has_function_calls(&self) -> bool {
        !self.function_calls.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
