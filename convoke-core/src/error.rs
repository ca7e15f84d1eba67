//! Error Taxonomy
//!
//! Typed failures for transport classification, protocol parsing, tool
//! dispatch, and the orchestration loop. Every error carries enough detail
//! (HTTP status, body snippet, or tool name) to be actionable by the caller.

use thiserror::Error;

/// Engine-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// HTTP 401/403 — bad or under-privileged API key.
    #[error("authentication failed (HTTP {status}): {message}")]
    Auth { status: u16, message: String },

    /// HTTP 404 — the configured model does not exist.
    #[error("unknown model: {message}")]
    UnknownModel { message: String },

    /// HTTP 429 — retried internally by the transport; surfaces only when an
    /// individual attempt is reported.
    #[error("rate limited: {message}")]
    RateLimited { message: String },

    /// The rate-limit retry budget is used up.
    #[error("max retries exceeded after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// 5xx or any other unclassified HTTP failure. Not retried; surfaced
    /// immediately with the raw body.
    #[error("upstream error (HTTP {status}): {message}")]
    Upstream { status: u16, message: String },

    /// Malformed or unexpected response shape from the provider.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("function not found: {name}")]
    ToolNotFound { name: String },

    /// A tool handler failed or returned a failure result; aborts the run.
    #[error("function '{name}' failed: {message}")]
    ToolExecution { name: String, message: String },

    /// Two consecutive rounds requested identical tool calls.
    #[error("repeated identical tool calls detected, stopping to avoid wasted tokens")]
    LoopDetected,

    #[error("run cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Truncate a response body to a printable snippet.
    pub fn body_snippet(body: &str) -> String {
        const MAX: usize = 200;
        let trimmed = body.trim();
        if trimmed.len() <= MAX {
            trimmed.to_string()
        } else {
            let mut end = MAX;
            while !trimmed.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}…", &trimmed[..end])
        }
    }
}
