//! Tool Registry & Dispatch
//!
//! Holds tool handlers keyed by name and executes requested calls.
//! Dispatch never propagates a fault: unknown names and handler errors both
//! become failure results the orchestration loop can treat uniformly.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::Error;
use crate::types::{FunctionCall, FunctionDefinition, FunctionResult};

// ---------------------------------------------------------------------------
// Handler capability
// ---------------------------------------------------------------------------

/// A host-provided capability the model may invoke. Handlers are injected at
/// composition time; the core knows nothing of their internals.
///
/// `execute` receives the opaque arguments JSON and must return
/// synchronously; a handler that needs concurrency manages it internally.
/// An `Err` models a handler fault and is converted to a failure result.
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;
    fn definition(&self) -> FunctionDefinition;
    fn execute(&self, arguments_json: &str) -> anyhow::Result<FunctionResult>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Explicit registry instance, constructed once at startup and immutable
/// after initial registration.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Box<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Box<dyn ToolHandler>) {
        let name = handler.name().to_string();
        if name.is_empty() {
            warn!("refusing to register handler with empty name");
            return;
        }
        debug!(function = %name, "registered function");
        if self.handlers.insert(name.clone(), handler).is_some() {
            warn!(function = %name, "replaced previously registered handler");
        }
    }

    /// Definitions for every registered handler, advertised to the model.
    pub fn definitions(&self) -> Vec<FunctionDefinition> {
        self.handlers.values().map(|h| h.definition()).collect()
    }

    /// Execute one call. The returned result always carries the originating
    /// call id so the loop can correlate it back to the message list.
    pub fn execute(&self, call: &FunctionCall) -> FunctionResult {
        let Some(handler) = self.handlers.get(&call.name) else {
            let error = Error::ToolNotFound {
                name: call.name.clone(),
            };
            warn!(function = %call.name, "{error}");
            return FunctionResult::err(call.id.clone(), error.to_string());
        };

        debug!(function = %call.name, "executing function");
        match handler.execute(&call.arguments) {
            Ok(mut result) => {
                result.function_call_id = call.id.clone();
                result
            }
            Err(e) => FunctionResult::err(
                call.id.clone(),
                format!("error executing function {}: {e}", call.name),
            ),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
