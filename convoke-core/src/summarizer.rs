//! Context Summarizer
//!
//! Compresses the recent conversation into a short bullet list the
//! orchestrator injects as memory on later turns. Summarization is strictly
//! best-effort: every failure is swallowed and logged at debug level.

use serde_json::{json, Value};
use tracing::debug;

use crate::client::ModelClient;
use crate::types::Message;

/// How many trailing conversational messages feed the summary.
const WINDOW: usize = 6;

const SUMMARY_INSTRUCTION: &str = "You are a conversation summarizer. In at most \
100 words, capture the key points of this conversation:\n\
1. What the user wanted\n\
2. What actions were taken\n\
3. The current progress or result\n\
Format: a terse bullet list, each point under 20 words.";

/// Summarize the tail of the conversation. `None` when there is nothing to
/// summarize or the model call fails.
pub async fn summarize(client: &dyn ModelClient, conversation: &[Message]) -> Option<String> {
    let start = conversation.len().saturating_sub(WINDOW);
    let tail: Vec<Message> = conversation[start..]
        .iter()
        .filter(|m| m.is_conversational())
        .cloned()
        .collect();
    if tail.is_empty() {
        return None;
    }

    let mut request = Vec::with_capacity(tail.len() + 2);
    request.push(Message::system(SUMMARY_INSTRUCTION));
    request.extend(tail);
    request.push(Message::user("Summarize the conversation above."));

    let text = if client.supports_structured_output() {
        match client.chat_structured(&request, &summary_schema()).await {
            Ok(resp) => resp
                .content
                .as_deref()
                .and_then(parse_summary_items)
                .map(format_summary_items),
            Err(e) => {
                debug!(error = %e, "structured summary failed, trying plain");
                None
            }
        }
    } else {
        None
    };

    let text = match text {
        Some(t) => Some(t),
        None => match client.chat(&request, &[]).await {
            Ok(resp) => resp.content,
            Err(e) => {
                debug!(error = %e, "summary generation failed");
                None
            }
        },
    };

    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

/// JSON schema for the structured-output path: an object with a single
/// `items` array of strings.
fn summary_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "items": {
                "type": "array",
                "items": { "type": "string" }
            }
        },
        "required": ["items"]
    })
}

fn parse_summary_items(content: &str) -> Option<Vec<String>> {
    let value: Value = serde_json::from_str(content.trim()).ok()?;
    let items = value.get("items")?.as_array()?;
    let lines: Vec<String> = items
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines)
    }
}

fn format_summary_items(items: Vec<String>) -> String {
    items
        .iter()
        .map(|line| format!("• {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
