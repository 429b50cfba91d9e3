//! Configuration loading, validation, and management for Helmsman.
//!
//! Loads configuration from `~/.helmsman/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.helmsman/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model client settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Orchestrator behavior
    #[serde(default)]
    pub agent: AgentSettings,

    /// Token budget and compaction policy
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// OpenAI-compatible base URL (Ollama, OpenAI, OpenRouter, vLLM...)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Context window of the model, in tokens
    #[serde(default = "default_context_size")]
    pub context_size: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:11434/v1".into()
}
fn default_model() -> String {
    "qwen2.5-coder:14b".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_context_size() -> usize {
    32_000
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            context_size: default_context_size(),
            api_key: None,
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("context_size", &self.context_size)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Run multi-call batches concurrently
    #[serde(default = "default_true")]
    pub parallel_tools: bool,

    /// Append a "check your context" hint to redundant-call errors
    #[serde(default = "default_true")]
    pub check_context_msg: bool,

    /// Dump the conversation to JSON on exit
    #[serde(default = "default_true")]
    pub auto_dump: bool,

    #[serde(default = "default_dump_dir")]
    pub dump_dir: PathBuf,

    /// Approve every protected call without prompting
    #[serde(default)]
    pub auto_confirm: bool,

    /// Bound on automatic follow-up requests within one user turn
    #[serde(default = "default_max_follow_ups")]
    pub max_follow_ups: u32,

    /// Ask the model for reasoning and log more detail
    #[serde(default)]
    pub verbose: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_true() -> bool {
    true
}
fn default_dump_dir() -> PathBuf {
    PathBuf::from("helmsman_dumps")
}
fn default_max_follow_ups() -> u32 {
    25
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            parallel_tools: true,
            check_context_msg: true,
            auto_dump: true,
            dump_dir: default_dump_dir(),
            auto_confirm: false,
            max_follow_ups: default_max_follow_ups(),
            verbose: false,
            system_prompt: None,
        }
    }
}

/// Token estimation constants and the auto-compaction policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Compact once estimated usage exceeds this fraction of the context window
    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold: f64,

    /// Minimum seconds between automatic compactions
    #[serde(default = "default_min_compaction_interval")]
    pub min_compaction_interval_secs: u64,

    /// Messages kept verbatim at the tail of a compacted log
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,

    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: f64,

    #[serde(default = "default_tokens_per_message")]
    pub tokens_per_message: usize,

    #[serde(default = "default_tokens_per_role")]
    pub tokens_per_role: usize,
}

fn default_compaction_threshold() -> f64 {
    0.95
}
fn default_min_compaction_interval() -> u64 {
    300
}
fn default_keep_recent() -> usize {
    6
}
fn default_chars_per_token() -> f64 {
    4.0
}
fn default_tokens_per_message() -> usize {
    4
}
fn default_tokens_per_role() -> usize {
    1
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            compaction_threshold: default_compaction_threshold(),
            min_compaction_interval_secs: default_min_compaction_interval(),
            keep_recent: default_keep_recent(),
            chars_per_token: default_chars_per_token(),
            tokens_per_message: default_tokens_per_message(),
            tokens_per_role: default_tokens_per_role(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Kill shell commands that run longer than this
    #[serde(default = "default_bash_timeout")]
    pub bash_timeout_secs: u64,
}

fn default_bash_timeout() -> u64 {
    30
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            bash_timeout_secs: default_bash_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.helmsman/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `HELMSMAN_API_KEY`
    /// - `HELMSMAN_MODEL`
    /// - `HELMSMAN_BASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_path())
    }

    /// Load `path`, then apply the environment overrides and re-validate.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("HELMSMAN_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("HELMSMAN_MODEL") {
            self.model.model = model;
        }
        if let Ok(url) = std::env::var("HELMSMAN_BASE_URL") {
            self.model.base_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".helmsman")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.temperature < 0.0 || self.model.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.model.context_size == 0 {
            return Err(ConfigError::ValidationError(
                "model.context_size must be > 0".into(),
            ));
        }

        if !(self.budget.compaction_threshold > 0.0 && self.budget.compaction_threshold <= 1.0) {
            return Err(ConfigError::ValidationError(
                "budget.compaction_threshold must be in (0.0, 1.0]".into(),
            ));
        }

        if self.budget.chars_per_token <= 0.0 {
            return Err(ConfigError::ValidationError(
                "budget.chars_per_token must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
