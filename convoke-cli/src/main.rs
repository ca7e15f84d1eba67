//! Convoke CLI
//!
//! Binary entry point. Modes:
//! - `ask`: one-shot prompt, answer on stdout
//! - `chat`: interactive REPL
//! - `config`: configuration management

mod chat;
mod commands;

use anyhow::Result;
use clap::Parser;

use convoke_core::config::EngineConfig;

use crate::chat::{run_ask, run_chat_mode};
use crate::commands::{run_config_command, Cli, Commands};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    // All logging goes to stderr (stdout is for the final answer).
    let is_tty = std::io::IsTerminal::is_terminal(&std::io::stderr());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_ansi(is_tty)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("❌ Convoke fatal error: {e}");
        for cause in e.chain().skip(1) {
            eprintln!("   caused by: {cause}");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = if let Some(ref path) = cli.config {
        EngineConfig::load_from(path).map_err(|e| {
            anyhow::anyhow!("failed to load config from '{}': {}", path.display(), e)
        })?
    } else {
        EngineConfig::load_default()?
    };

    match cli.command {
        Commands::Ask { prompt } => run_ask(config, prompt.join(" ")).await,
        Commands::Chat => run_chat_mode(config).await,
        Commands::Config { action } => run_config_command(action, config),
    }
}
