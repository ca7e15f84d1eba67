//! Model Client
//!
//! Async seam between the orchestration loop and the provider: an adapter
//! plus a transport behind one trait, so the loop and summarizer can be
//! exercised against mocks.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::adapter::ProtocolAdapter;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::transport::Transport;
use crate::types::{AiResponse, FunctionDefinition, Message};

/// One atomic model call: request build, HTTP send, response parse.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[FunctionDefinition],
    ) -> Result<AiResponse>;

    /// Ask for output constrained to `schema`. Families without structured
    /// output fall back to a plain request.
    async fn chat_structured(&self, messages: &[Message], schema: &Value) -> Result<AiResponse>;

    fn supports_structured_output(&self) -> bool;
}

/// Production client: a protocol adapter wired to the HTTP transport.
pub struct HttpModelClient {
    adapter: Arc<dyn ProtocolAdapter>,
    transport: Transport,
    config: EngineConfig,
    api_key: String,
}

impl HttpModelClient {
    pub fn new(
        adapter: Arc<dyn ProtocolAdapter>,
        transport: Transport,
        config: EngineConfig,
    ) -> Result<Self> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| Error::Config("no API key configured".into()))?;
        Ok(Self {
            adapter,
            transport,
            config,
            api_key,
        })
    }

    async fn send(&self, request: Value) -> Result<AiResponse> {
        let url = self.config.api_url();
        debug!(adapter = self.adapter.name(), %url, "model call");
        let body = self
            .transport
            .send(&url, self.config.provider, &self.api_key, &request)
            .await?;
        self.adapter.parse_response(&body)
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[FunctionDefinition],
    ) -> Result<AiResponse> {
        let request = self.adapter.build_request(messages, tools, None);
        self.send(request).await
    }

    async fn chat_structured(&self, messages: &[Message], schema: &Value) -> Result<AiResponse> {
        let request = if self.adapter.supports_structured_output() {
            self.adapter.build_request(messages, &[], Some(schema))
        } else {
            self.adapter.build_request(messages, &[], None)
        };
        self.send(request).await
    }

    fn supports_structured_output(&self) -> bool {
        self.adapter.supports_structured_output()
    }
}
