//! # Convoke Core
//!
//! Core library for the Convoke tool-calling orchestration engine.
//! Provides the canonical conversation model, the protocol-adapter and
//! model-client seams, HTTP transport with retry, the tool registry, the
//! multi-round orchestration loop, and the context summarizer.

pub mod adapter;
pub mod client;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod summarizer;
pub mod system_prompt;
pub mod transport;
pub mod types;

// Re-export key types
pub use adapter::ProtocolAdapter;
pub use client::{HttpModelClient, ModelClient};
pub use config::{AgentSettings, EngineConfig, Provider, RetryConfig};
pub use error::{Error, Result};
pub use orchestrator::{NoopObserver, Orchestrator, RunObserver};
pub use registry::{ToolHandler, ToolRegistry};
pub use transport::{RetryPolicy, Transport};
pub use types::{
    AiResponse, FunctionCall, FunctionDefinition, FunctionResult, Message, Role, ThinkingType,
};
