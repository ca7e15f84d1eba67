//! Configuration
//!
//! TOML-based configuration: provider selection, API key, base URL, model,
//! tool-mode flag, and loop/retry settings. Includes startup validation and
//! a sample config for `config init`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Provider identity
// ---------------------------------------------------------------------------

/// Supported provider endpoints. Everything except `Gemini` speaks the
/// OpenAI chat-completions protocol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Gemini,
    SiliconFlow,
    ZenMux,
    Custom,
}

impl Default for Provider {
    fn default() -> Self {
        Provider::OpenAi
    }
}

impl Provider {
    /// Authorization header for this provider. A pure function of provider
    /// identity, never of message content.
    pub fn auth_header(&self, api_key: &str) -> (&'static str, String) {
        match self {
            Provider::Gemini => ("x-goog-api-key", api_key.to_string()),
            Provider::ZenMux => ("x-api-key", api_key.to_string()),
            _ => ("Authorization", format!("Bearer {api_key}")),
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Provider::SiliconFlow => "https://api.siliconflow.cn/v1",
            Provider::ZenMux => "https://zenmux.ai/api/v1",
            Provider::Custom => "",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini-pro",
            Provider::SiliconFlow => "deepseek-ai/DeepSeek-R1-0528-Qwen3-8B",
            Provider::ZenMux => "kuaishou/kat-coder-pro-v1-free",
            _ => "gpt-4",
        }
    }

    /// Environment variable consulted when no API key is configured.
    pub fn api_key_env_var(&self) -> Option<&'static str> {
        match self {
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::Gemini => Some("GOOGLE_API_KEY"),
            Provider::SiliconFlow => Some("SILICONFLOW_API_KEY"),
            Provider::ZenMux => Some("ZENMUX_API_KEY"),
            Provider::Custom => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration structures
// ---------------------------------------------------------------------------

/// Top-level engine configuration (maps to TOML).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub provider: Provider,

    /// API key. If absent, falls back to the provider's environment variable.
    pub api_key: Option<String>,

    /// Custom base URL (e.g. for OpenAI-compatible endpoints).
    pub base_url: Option<String>,

    /// Model name. Defaults per provider.
    pub model: Option<String>,

    /// When enabled, tool definitions are advertised to the model and the
    /// operator system prompt is used; otherwise the engine runs in plain
    /// chat mode.
    #[serde(default = "default_true")]
    pub hacking_mode: bool,

    #[serde(default)]
    pub agent: AgentSettings,
}

fn default_true() -> bool {
    true
}

/// Orchestration-loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Maximum tool rounds per run (the loop's circuit breaker).
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_max_rounds() -> usize {
    6
}

/// Retry policy for rate-limited transport calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_multiplier(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    30000
}
fn default_multiplier() -> f64 {
    2.0
}

// ---------------------------------------------------------------------------
// Resolution and loading
// ---------------------------------------------------------------------------

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            api_key: None,
            base_url: None,
            model: None,
            hacking_mode: true,
            agent: AgentSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Effective base URL, without a trailing slash.
    pub fn base_url(&self) -> String {
        self.base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }

    /// Effective model name.
    pub fn model(&self) -> String {
        self.model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_model())
            .to_string()
    }

    /// Full endpoint URL for a model call.
    pub fn api_url(&self) -> String {
        if self.provider == Provider::Gemini {
            format!("{}/models/{}:generateContent", self.base_url(), self.model())
        } else {
            format!("{}/chat/completions", self.base_url())
        }
    }

    /// Resolve the API key from config, then the provider's env var.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            return Some(key.to_string());
        }
        self.provider
            .api_key_env_var()
            .and_then(|var| std::env::var(var).ok())
    }

    /// Validate the config on startup.
    pub fn validate(&self) -> Result<()> {
        if self.resolve_api_key().is_none() {
            let hint = self
                .provider
                .api_key_env_var()
                .map(|v| format!(" or set {v}"))
                .unwrap_or_default();
            return Err(Error::Config(format!(
                "no API key configured for provider '{}': add api_key to the config{hint}",
                provider_name(self.provider)
            )));
        }
        if self.provider == Provider::Custom && self.base_url().is_empty() {
            return Err(Error::Config(
                "provider 'custom' requires an explicit base_url".into(),
            ));
        }
        Ok(())
    }

    /// Load config from the default location: `~/.config/convoke/config.toml`.
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            info!("no config file found at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;
        info!(path = %path.display(), provider = provider_name(config.provider), "loaded config");
        Ok(config)
    }

    /// Default config file path.
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("could not determine config directory".into()))?;
        Ok(dir.join("convoke").join("config.toml"))
    }
}

pub fn provider_name(provider: Provider) -> &'static str {
    match provider {
        Provider::OpenAi => "openai",
        Provider::Gemini => "gemini",
        Provider::SiliconFlow => "siliconflow",
        Provider::ZenMux => "zenmux",
        Provider::Custom => "custom",
    }
}

/// Generate a sample config TOML string.
pub fn sample_config() -> String {
    r#"# Convoke configuration

# Provider: "openai", "gemini", "siliconflow", "zenmux", or "custom"
provider = "openai"

# api_key = "sk-..."        # Or set OPENAI_API_KEY / GOOGLE_API_KEY etc.
# base_url = "https://api.openai.com/v1"
# model = "gpt-4"

# Advertise tools to the model and use the operator system prompt.
hacking_mode = true

[agent]
max_rounds = 6

[agent.retry]
max_attempts = 3
base_delay_ms = 1000
max_delay_ms = 30000
backoff_multiplier = 2.0
"#
    .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
