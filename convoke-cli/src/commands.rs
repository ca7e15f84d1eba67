//! CLI argument definitions and the config subcommand.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use convoke_core::config::{self, EngineConfig};

#[derive(Parser)]
#[command(name = "convoke", version, about = "Convoke — tool-calling AI orchestration engine")]
pub struct Cli {
    /// Path to config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// One-shot question, print the final answer
    Ask {
        /// The prompt to send
        prompt: Vec<String>,
    },
    /// Interactive REPL chat mode
    Chat,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a sample config to the default location
    Init,
}

pub fn run_config_command(action: ConfigAction, config: EngineConfig) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{toml_str}");
        }
        ConfigAction::Init => {
            let path = EngineConfig::default_path()?;
            if path.exists() {
                eprintln!("Config already exists at: {}", path.display());
                eprintln!("Edit it directly or delete it first.");
            } else {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, config::sample_config())?;
                eprintln!("✅ Config written to: {}", path.display());
                eprintln!("   Edit it to set your provider and API key.");
            }
        }
    }
    Ok(())
}
