//! Orchestration Loop
//!
//! Round-based state machine driving one user turn to completion: call the
//! model, execute any requested tools, feed results back, repeat. Bounded by
//! a round budget with loop detection and cooperative cancellation.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ModelClient;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::registry::ToolRegistry;
use crate::summarizer;
use crate::system_prompt;
use crate::types::{
    AiResponse, FunctionCall, FunctionResult, Message, ThinkingType,
};

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// Purely informational callbacks for one run. Conversation snapshots are
/// copies; observers never receive a live reference.
pub trait RunObserver: Send + Sync {
    /// Human-readable status line with a category tag.
    fn on_thinking(&self, _status: &str, _thinking_type: ThinkingType) {}
    /// The tool calls about to execute this round.
    fn on_tool_calls(&self, _calls: &[FunctionCall]) {}
    /// The results just obtained.
    fn on_tool_results(&self, _results: &[FunctionResult]) {}
    /// A fresh context summary is available.
    fn on_summary(&self, _summary: &str) {}
    /// The conversation reached a state worth persisting.
    fn on_checkpoint(&self, _conversation: &[Message]) {}
}

/// Observer that ignores every event.
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives the multi-round tool-calling conversation for one user turn.
pub struct Orchestrator {
    client: Arc<dyn ModelClient>,
    registry: Arc<ToolRegistry>,
    max_rounds: usize,
    hacking_mode: bool,
}

impl Orchestrator {
    pub fn new(
        client: Arc<dyn ModelClient>,
        registry: Arc<ToolRegistry>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            client,
            registry,
            max_rounds: config.agent.max_rounds,
            hacking_mode: config.hacking_mode,
        }
    }

    /// Run one user turn to completion.
    ///
    /// Appends tool-call and result messages to `conversation` in causal
    /// order; never removes entries. Returns the final assistant response or
    /// a typed failure.
    pub async fn run(
        &self,
        conversation: &mut Vec<Message>,
        cancel: &CancellationToken,
        observer: &dyn RunObserver,
    ) -> Result<AiResponse> {
        let mut extra: Vec<Message> = Vec::new();
        let mut last_signature: Option<String> = None;
        let mut response: Option<AiResponse> = None;

        for round in 0..self.max_rounds {
            if cancel.is_cancelled() {
                info!(round, "run cancelled before round start");
                return Err(Error::Cancelled);
            }

            let status = if round == 0 {
                "Analyzing your request..."
            } else {
                "Continuing to work toward completion..."
            };
            observer.on_thinking(status, ThinkingType::Analysis);

            let resp = self.call_model(conversation, &extra, true).await?;

            if !resp.has_function_calls() {
                if !resp.has_content() {
                    return Err(Error::Protocol(
                        "model returned neither content nor tool calls".into(),
                    ));
                }
                response = Some(resp);
                break;
            }

            let signature = calls_signature(&resp.function_calls);
            if last_signature.as_deref() == Some(signature.as_str()) {
                warn!(round, "identical tool-call set as previous round");
                return Err(Error::LoopDetected);
            }
            last_signature = Some(signature);

            let mut announce = String::from("About to call:\n");
            for call in &resp.function_calls {
                announce.push_str(&format!("• {}\n", display_name(&call.name)));
            }
            observer.on_thinking(announce.trim(), ThinkingType::FunctionCall);
            observer.on_tool_calls(&resp.function_calls);

            // One assistant message per call, before any execution, so the
            // wire order the adapters depend on is preserved.
            for call in &resp.function_calls {
                conversation.push(Message::tool_call(call.clone()));
            }

            let results = self
                .execute_round(&resp.function_calls, cancel, observer)
                .await?;

            let mut report = String::from("Functions executed:\n");
            for (call, result) in resp.function_calls.iter().zip(&results) {
                let mark = if result.success { "✓" } else { "✗" };
                report.push_str(&format!("• {} {}\n", display_name(&call.name), mark));
            }
            observer.on_thinking(report.trim(), ThinkingType::Execution);
            observer.on_tool_results(&results);

            for (call, result) in resp.function_calls.iter().zip(&results) {
                conversation.push(Message::function_result(
                    &call.name,
                    result.result.as_deref().unwrap_or(""),
                    call.id.clone(),
                ));
            }
            observer.on_checkpoint(conversation);

            observer.on_thinking(
                "Composing a reply from the results...",
                ThinkingType::CodeGeneration,
            );
            response = Some(resp);
        }

        // The loop always sets `response` unless max_rounds is zero.
        let resp = response.ok_or_else(|| Error::Config("max_rounds must be at least 1".into()))?;

        // Round budget exhausted while the model still wanted tools and gave
        // no text: one forced-final call with tool use disabled.
        let final_resp = if resp.has_function_calls() && !resp.has_content() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            info!("round budget exhausted, forcing a final answer");
            extra.push(Message::user(
                "Give a final answer based on the results you already have. \
                 Do not call any more functions.",
            ));
            self.call_model(conversation, &extra, false).await?
        } else {
            resp
        };

        if !final_resp.has_content() {
            return Err(Error::Protocol(
                "model produced no final answer after tool rounds".into(),
            ));
        }
        Ok(final_resp)
    }

    /// Best-effort context summarization; never fails the primary turn.
    pub async fn summarize_context(
        &self,
        conversation: &[Message],
        observer: &dyn RunObserver,
    ) -> Option<String> {
        let summary = summarizer::summarize(self.client.as_ref(), conversation).await?;
        observer.on_summary(&summary);
        Some(summary)
    }

    /// One model call: system prompt, memory summary, filtered conversation,
    /// and any run-scoped extra messages.
    async fn call_model(
        &self,
        conversation: &[Message],
        extra: &[Message],
        enable_tools: bool,
    ) -> Result<AiResponse> {
        let mut wire = Vec::with_capacity(conversation.len() + extra.len() + 2);
        wire.push(Message::system(system_prompt::for_mode(self.hacking_mode)));
        if let Some(summary) = latest_summary(conversation) {
            wire.push(Message::system(format!(
                "Conversation memory:\n{}",
                summary.trim()
            )));
        }
        wire.extend(
            conversation
                .iter()
                .filter(|m| m.is_conversational())
                .cloned(),
        );
        wire.extend(extra.iter().filter(|m| m.is_conversational()).cloned());

        let tools = if enable_tools && self.hacking_mode {
            self.registry.definitions()
        } else {
            Vec::new()
        };

        self.client.chat(&wire, &tools).await
    }

    /// Execute a round's calls in order. The first failure aborts the run;
    /// cancellation interrupts an in-flight execution.
    async fn execute_round(
        &self,
        calls: &[FunctionCall],
        cancel: &CancellationToken,
        observer: &dyn RunObserver,
    ) -> Result<Vec<FunctionResult>> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let registry = Arc::clone(&self.registry);
            let owned = call.clone();
            let handle = tokio::task::spawn_blocking(move || registry.execute(&owned));
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                joined = handle => joined.unwrap_or_else(|e| {
                    FunctionResult::err(call.id.clone(), format!("function task failed: {e}"))
                }),
            };

            let failed = !result.success;
            results.push(result);
            if failed {
                let message = results
                    .last()
                    .and_then(|r| r.error.clone())
                    .unwrap_or_else(|| "unknown error".into());
                observer.on_tool_results(&results);
                return Err(Error::ToolExecution {
                    name: call.name.clone(),
                    message,
                });
            }
            debug!(function = %call.name, "function succeeded");
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Deterministic signature of a round's ordered tool calls, used to detect a
/// stuck model re-issuing the same set.
fn calls_signature(calls: &[FunctionCall]) -> String {
    let mut parts = Vec::with_capacity(calls.len());
    for call in calls {
        parts.push(format!("{}|{}", call.name, call.arguments.trim()));
    }
    parts.join("\n")
}

/// Content of the most recent summary message, if any.
fn latest_summary(conversation: &[Message]) -> Option<&str> {
    conversation
        .iter()
        .rev()
        .find(|m| m.is_summary)
        .map(|m| m.text())
}

/// Friendly display name for the built-in tool vocabulary.
fn display_name(name: &str) -> &str {
    match name {
        "web_request" => "Web request",
        "list_files" => "List files",
        "read_file" => "Read file",
        "write_file" => "Write file",
        "delete_file" => "Delete file",
        "search_files" => "Search files",
        "python_execute" => "Python execution",
        "terminal_execute" => "Terminal command",
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ToolHandler;
    use crate::types::FunctionDefinition;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn content_response(text: &str) -> AiResponse {
        AiResponse {
            content: Some(text.into()),
            function_calls: vec![],
            finish_reason: "stop".into(),
        }
    }

    fn tool_response(calls: Vec<FunctionCall>) -> AiResponse {
        AiResponse {
            content: None,
            function_calls: calls,
            finish_reason: "tool_calls".into(),
        }
    }

    /// Scripted client that records how many calls were made and whether
    /// tools were advertised on each.
    struct ScriptedClient {
        responses: Mutex<Vec<AiResponse>>,
        calls: AtomicUsize,
        tools_per_call: Mutex<Vec<usize>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<AiResponse>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
                tools_per_call: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedClient {
        async fn chat(
            &self,
            _messages: &[Message],
            tools: &[FunctionDefinition],
        ) -> Result<AiResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.tools_per_call.lock().unwrap().push(tools.len());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Err(Error::Protocol("no scripted response left".into()))
            } else {
                Ok(responses.remove(0))
            }
        }

        async fn chat_structured(
            &self,
            _messages: &[Message],
            _schema: &Value,
        ) -> Result<AiResponse> {
            Err(Error::Protocol("structured output not scripted".into()))
        }

        fn supports_structured_output(&self) -> bool {
            false
        }
    }

    /// Counting handler with a fixed outcome.
    struct CountingTool {
        name: &'static str,
        succeed: bool,
        executions: Arc<AtomicUsize>,
    }

    impl ToolHandler for CountingTool {
        fn name(&self) -> &str {
            self.name
        }
        fn definition(&self) -> FunctionDefinition {
            FunctionDefinition::new(self.name, "test tool")
        }
        fn execute(&self, _arguments_json: &str) -> anyhow::Result<FunctionResult> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(FunctionResult::ok(None, "file_a.txt\nfile_b.txt"))
            } else {
                Ok(FunctionResult::err(None, "permission denied"))
            }
        }
    }

    fn registry_with(tools: Vec<CountingTool>) -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(Box::new(tool));
        }
        Arc::new(registry)
    }

    fn orchestrator(
        client: Arc<ScriptedClient>,
        registry: Arc<ToolRegistry>,
        max_rounds: usize,
    ) -> Orchestrator {
        let mut config = EngineConfig::default();
        config.agent.max_rounds = max_rounds;
        Orchestrator::new(client, registry, &config)
    }

    #[tokio::test]
    async fn completes_without_tool_calls() {
        let client = Arc::new(ScriptedClient::new(vec![content_response("Hello!")]));
        let orch = orchestrator(client.clone(), registry_with(vec![]), 6);

        let mut conversation = vec![Message::user("hi")];
        let resp = orch
            .run(&mut conversation, &CancellationToken::new(), &NoopObserver)
            .await
            .unwrap();

        assert_eq!(resp.content.as_deref(), Some("Hello!"));
        assert_eq!(client.call_count(), 1);
        assert_eq!(conversation.len(), 1);
    }

    #[tokio::test]
    async fn tool_round_then_final_answer() {
        let executions = Arc::new(AtomicUsize::new(0));
        let registry = registry_with(vec![CountingTool {
            name: "list_files",
            succeed: true,
            executions: executions.clone(),
        }]);
        let client = Arc::new(ScriptedClient::new(vec![
            tool_response(vec![FunctionCall::new(
                Some("call_a".into()),
                "list_files",
                r#"{"path":"/tmp"}"#,
            )]),
            content_response("Here are the files: file_a.txt, file_b.txt"),
        ]));
        let orch = orchestrator(client.clone(), registry, 6);

        let mut conversation = vec![Message::user("list files in /tmp")];
        let resp = orch
            .run(&mut conversation, &CancellationToken::new(), &NoopObserver)
            .await
            .unwrap();

        assert!(resp.content.unwrap().starts_with("Here are the files"));
        assert_eq!(client.call_count(), 2);
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        // user + assistant tool call + function result
        assert_eq!(conversation.len(), 3);
        assert_eq!(conversation[1].function_calls.len(), 1);
        assert_eq!(conversation[2].function_name.as_deref(), Some("list_files"));
        assert_eq!(conversation[2].tool_call_id.as_deref(), Some("call_a"));
    }

    #[tokio::test]
    async fn repeated_identical_calls_abort_without_third_model_call() {
        let executions = Arc::new(AtomicUsize::new(0));
        let registry = registry_with(vec![CountingTool {
            name: "web_request",
            succeed: true,
            executions: executions.clone(),
        }]);
        let same_call =
            || vec![FunctionCall::new(None, "web_request", r#"{"url":"http://x"}"#)];
        let client = Arc::new(ScriptedClient::new(vec![
            tool_response(same_call()),
            tool_response(same_call()),
            content_response("never reached"),
        ]));
        let orch = orchestrator(client.clone(), registry, 6);

        let mut conversation = vec![Message::user("fetch http://x")];
        let err = orch
            .run(&mut conversation, &CancellationToken::new(), &NoopObserver)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::LoopDetected));
        assert_eq!(client.call_count(), 2);
        // Round 1 executed once; round 2 aborted before executing anything.
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn whitespace_only_argument_difference_still_loops() {
        let registry = registry_with(vec![CountingTool {
            name: "web_request",
            succeed: true,
            executions: Arc::new(AtomicUsize::new(0)),
        }]);
        let client = Arc::new(ScriptedClient::new(vec![
            tool_response(vec![FunctionCall::new(None, "web_request", r#"{"url":"http://x"}"#)]),
            tool_response(vec![FunctionCall::new(
                None,
                "web_request",
                "  {\"url\":\"http://x\"}  ",
            )]),
        ]));
        let orch = orchestrator(client, registry, 6);

        let mut conversation = vec![Message::user("fetch")];
        let err = orch
            .run(&mut conversation, &CancellationToken::new(), &NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LoopDetected));
    }

    #[tokio::test]
    async fn exhausted_rounds_force_one_final_call_without_tools() {
        let executions = Arc::new(AtomicUsize::new(0));
        let registry = registry_with(vec![CountingTool {
            name: "terminal_execute",
            succeed: true,
            executions: executions.clone(),
        }]);
        // Two rounds of different calls, then the forced final.
        let client = Arc::new(ScriptedClient::new(vec![
            tool_response(vec![FunctionCall::new(None, "terminal_execute", r#"{"cmd":"ls"}"#)]),
            tool_response(vec![FunctionCall::new(None, "terminal_execute", r#"{"cmd":"pwd"}"#)]),
            content_response("All done."),
        ]));
        let orch = orchestrator(client.clone(), registry, 2);

        let mut conversation = vec![Message::user("poke around")];
        let resp = orch
            .run(&mut conversation, &CancellationToken::new(), &NoopObserver)
            .await
            .unwrap();

        assert_eq!(resp.content.as_deref(), Some("All done."));
        // max_rounds + 1 model calls, never more.
        assert_eq!(client.call_count(), 3);
        let tools_per_call = client.tools_per_call.lock().unwrap().clone();
        assert!(tools_per_call[0] > 0);
        assert!(tools_per_call[1] > 0);
        assert_eq!(tools_per_call[2], 0);
    }

    #[tokio::test]
    async fn forced_final_without_content_is_an_error() {
        let registry = registry_with(vec![CountingTool {
            name: "read_file",
            succeed: true,
            executions: Arc::new(AtomicUsize::new(0)),
        }]);
        let client = Arc::new(ScriptedClient::new(vec![
            tool_response(vec![FunctionCall::new(None, "read_file", r#"{"path":"a"}"#)]),
            // Forced final still tries to call tools and says nothing.
            tool_response(vec![FunctionCall::new(None, "read_file", r#"{"path":"b"}"#)]),
        ]));
        let orch = orchestrator(client.clone(), registry, 1);

        let mut conversation = vec![Message::user("read a")];
        let err = orch
            .run(&mut conversation, &CancellationToken::new(), &NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn first_failing_tool_short_circuits_the_round() {
        let ok_runs = Arc::new(AtomicUsize::new(0));
        let never_runs = Arc::new(AtomicUsize::new(0));
        let registry = registry_with(vec![
            CountingTool {
                name: "write_file",
                succeed: true,
                executions: ok_runs.clone(),
            },
            CountingTool {
                name: "delete_file",
                succeed: false,
                executions: Arc::new(AtomicUsize::new(0)),
            },
            CountingTool {
                name: "search_files",
                succeed: true,
                executions: never_runs.clone(),
            },
        ]);
        let client = Arc::new(ScriptedClient::new(vec![tool_response(vec![
            FunctionCall::new(None, "write_file", "{}"),
            FunctionCall::new(None, "delete_file", "{}"),
            FunctionCall::new(None, "search_files", "{}"),
        ])]));
        let orch = orchestrator(client, registry, 6);

        let mut conversation = vec![Message::user("clean up")];
        let err = orch
            .run(&mut conversation, &CancellationToken::new(), &NoopObserver)
            .await
            .unwrap_err();

        match err {
            Error::ToolExecution { name, message } => {
                assert_eq!(name, "delete_file");
                assert!(message.contains("permission denied"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(ok_runs.load(Ordering::SeqCst), 1);
        assert_eq!(never_runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unregistered_tool_fails_the_run_with_execution_error() {
        let client = Arc::new(ScriptedClient::new(vec![tool_response(vec![
            FunctionCall::new(None, "no_such_tool", "{}"),
        ])]));
        let orch = orchestrator(client, registry_with(vec![]), 6);

        let mut conversation = vec![Message::user("do the thing")];
        let err = orch
            .run(&mut conversation, &CancellationToken::new(), &NoopObserver)
            .await
            .unwrap_err();
        match err {
            Error::ToolExecution { name, message } => {
                assert_eq!(name, "no_such_tool");
                assert!(message.contains("not found"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_before_start_makes_no_calls() {
        let client = Arc::new(ScriptedClient::new(vec![content_response("unused")]));
        let orch = orchestrator(client.clone(), registry_with(vec![]), 6);

        let token = CancellationToken::new();
        token.cancel();
        let mut conversation = vec![Message::user("hi")];
        let err = orch
            .run(&mut conversation, &token, &NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn cancelling_between_rounds_prevents_the_next_round() {
        struct CancelOnResults {
            token: CancellationToken,
        }
        impl RunObserver for CancelOnResults {
            fn on_tool_results(&self, _results: &[FunctionResult]) {
                self.token.cancel();
            }
        }

        let executions = Arc::new(AtomicUsize::new(0));
        let registry = registry_with(vec![CountingTool {
            name: "list_files",
            succeed: true,
            executions: executions.clone(),
        }]);
        let client = Arc::new(ScriptedClient::new(vec![
            tool_response(vec![FunctionCall::new(None, "list_files", r#"{"path":"/a"}"#)]),
            tool_response(vec![FunctionCall::new(None, "list_files", r#"{"path":"/b"}"#)]),
        ]));
        let orch = orchestrator(client.clone(), registry, 6);

        let token = CancellationToken::new();
        let observer = CancelOnResults {
            token: token.clone(),
        };
        let mut conversation = vec![Message::user("list both")];
        let err = orch
            .run(&mut conversation, &token, &observer)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        // Round 1 ran fully; round 2 never called the model or any tool.
        assert_eq!(client.call_count(), 1);
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_response_from_client_is_a_protocol_error() {
        let client = Arc::new(ScriptedClient::new(vec![AiResponse {
            content: None,
            function_calls: vec![],
            finish_reason: "stop".into(),
        }]));
        let orch = orchestrator(client, registry_with(vec![]), 6);

        let mut conversation = vec![Message::user("hi")];
        let err = orch
            .run(&mut conversation, &CancellationToken::new(), &NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn latest_summary_is_injected_as_memory() {
        // The summary must not be sent as-is (it is filtered from the wire)
        // but its content rides in a system memory message.
        struct CaptureClient {
            seen_system: Mutex<Vec<String>>,
        }
        #[async_trait]
        impl ModelClient for CaptureClient {
            async fn chat(
                &self,
                messages: &[Message],
                _tools: &[FunctionDefinition],
            ) -> Result<AiResponse> {
                let mut seen = self.seen_system.lock().unwrap();
                for m in messages {
                    if m.role == crate::types::Role::System {
                        seen.push(m.text().to_string());
                    }
                }
                Ok(content_response("ok"))
            }
            async fn chat_structured(
                &self,
                _messages: &[Message],
                _schema: &Value,
            ) -> Result<AiResponse> {
                Err(Error::Protocol("unused".into()))
            }
            fn supports_structured_output(&self) -> bool {
                false
            }
        }

        let client = Arc::new(CaptureClient {
            seen_system: Mutex::new(Vec::new()),
        });
        let orch = Orchestrator::new(
            client.clone(),
            registry_with(vec![]),
            &EngineConfig::default(),
        );

        let mut conversation = vec![
            Message::user("earlier question"),
            Message::summary("• user wants the files listed"),
            Message::user("and now?"),
        ];
        orch.run(&mut conversation, &CancellationToken::new(), &NoopObserver)
            .await
            .unwrap();

        let seen = client.seen_system.lock().unwrap();
        assert!(seen
            .iter()
            .any(|s| s.starts_with("Conversation memory:")
                && s.contains("user wants the files listed")));
    }
}
