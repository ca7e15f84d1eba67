//! Ask and chat modes: engine assembly, a printing observer, and the
//! Ctrl-C to cancellation-token wiring shared by both.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use convoke_core::config::{provider_name, EngineConfig, Provider};
use convoke_core::transport::{RetryPolicy, Transport};
use convoke_core::types::{FunctionCall, FunctionResult, Message, ThinkingType};
use convoke_core::{
    Error, HttpModelClient, Orchestrator, ProtocolAdapter, RunObserver, ToolRegistry,
};
use convoke_gemini::GeminiAdapter;
use convoke_openai::OpenAiAdapter;

// ---------------------------------------------------------------------------
// Engine assembly
// ---------------------------------------------------------------------------

/// Pick the protocol adapter for the configured provider. Everything but
/// Gemini speaks the chat/completions family.
fn build_adapter(config: &EngineConfig) -> Arc<dyn ProtocolAdapter> {
    match config.provider {
        Provider::Gemini => Arc::new(GeminiAdapter::new()),
        other => Arc::new(OpenAiAdapter::new(other, config.model())),
    }
}

fn build_orchestrator(config: &EngineConfig) -> Result<Orchestrator> {
    let adapter = build_adapter(config);
    let transport = Transport::new(RetryPolicy::from(&config.agent.retry))?;
    let client = HttpModelClient::new(adapter, transport, config.clone())
        .context("failed to build model client")?;
    // Tool handlers are supplied by embedding applications; the CLI runs
    // with an empty registry.
    let registry = Arc::new(ToolRegistry::new());
    Ok(Orchestrator::new(Arc::new(client), registry, config))
}

/// Cancel `token` on the first Ctrl-C. Returns the listener task so the
/// caller can abort it once the turn finishes.
fn cancel_on_ctrl_c(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⏹ Stopping...");
            token.cancel();
        }
    })
}

// ---------------------------------------------------------------------------
// Printing observer
// ---------------------------------------------------------------------------

/// Streams run progress to stderr, leaving stdout for the final answer.
struct PrintingObserver;

impl RunObserver for PrintingObserver {
    fn on_thinking(&self, status: &str, _thinking_type: ThinkingType) {
        eprintln!("💭 {status}");
    }

    fn on_tool_calls(&self, calls: &[FunctionCall]) {
        for call in calls {
            eprintln!("🔧 {}({})", call.name, call.arguments.trim());
        }
    }

    fn on_tool_results(&self, results: &[FunctionResult]) {
        for result in results {
            if result.success {
                eprintln!("   ✓ ok");
            } else {
                eprintln!("   ✗ {}", result.error.as_deref().unwrap_or("failed"));
            }
        }
    }

    fn on_summary(&self, summary: &str) {
        eprintln!("📝 Context summary:\n{summary}");
    }
}

// ---------------------------------------------------------------------------
// One turn
// ---------------------------------------------------------------------------

/// Run one user turn, append the outcome to the conversation, and print the
/// final answer to stdout.
async fn run_turn(
    orchestrator: &Orchestrator,
    conversation: &mut Vec<Message>,
    prompt: &str,
) -> Result<()> {
    conversation.push(Message::user(prompt));

    let cancel = CancellationToken::new();
    let listener = cancel_on_ctrl_c(cancel.clone());
    let outcome = orchestrator
        .run(conversation, &cancel, &PrintingObserver)
        .await;
    listener.abort();

    match outcome {
        Ok(response) => {
            let content = response.content.unwrap_or_default();
            println!("{content}");
            conversation.push(Message::assistant(content));
            if let Some(summary) = orchestrator
                .summarize_context(conversation, &PrintingObserver)
                .await
            {
                conversation.push(Message::summary(summary));
            }
            Ok(())
        }
        Err(Error::Cancelled) => {
            eprintln!("⏹ Stopped.");
            conversation.push(Message::error("Stopped by user."));
            Ok(())
        }
        Err(e) => {
            conversation.push(Message::error(e.to_string()));
            Err(e.into())
        }
    }
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

pub async fn run_ask(config: EngineConfig, prompt: String) -> Result<()> {
    config.validate().context("configuration error")?;
    info!(provider = provider_name(config.provider), model = %config.model(), "ask mode");

    let orchestrator = build_orchestrator(&config)?;
    let mut conversation = Vec::new();
    run_turn(&orchestrator, &mut conversation, &prompt).await
}

pub async fn run_chat_mode(config: EngineConfig) -> Result<()> {
    if let Err(e) = config.validate() {
        eprintln!("❌ Configuration error: {e}");
        eprintln!("   Run `convoke config init` to set up your configuration.");
        std::process::exit(1);
    }

    let orchestrator = build_orchestrator(&config)?;
    let mut conversation: Vec<Message> = Vec::new();

    eprintln!("🤖 Convoke");
    eprintln!(
        "   Provider: {} | Model: {}",
        provider_name(config.provider),
        config.model()
    );
    eprintln!("   Type /quit to exit\n");

    let stdin = tokio::io::stdin();
    let reader = tokio::io::BufReader::new(stdin);
    let mut lines = tokio::io::AsyncBufReadExt::lines(reader);

    loop {
        eprint!("{}> ", provider_name(config.provider));
        let line = match lines.next_line().await? {
            Some(l) => l.trim().to_string(),
            None => break,
        };

        if line.is_empty() {
            continue;
        }

        match line.as_str() {
            "/quit" | "/exit" | "/q" => {
                eprintln!("Goodbye!");
                break;
            }
            "/clear" => {
                conversation.clear();
                eprintln!("🧹 Conversation cleared.");
                continue;
            }
            _ => {}
        }

        if let Err(e) = run_turn(&orchestrator, &mut conversation, &line).await {
            eprintln!("❌ {e:#}");
        }
    }

    Ok(())
}
