//! Configuration loading, validation, and management for Parley.
//!
//! Loads configuration from `~/.parley/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use parley_core::{AgentProfile, ChannelConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.parley/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// SQLite database URL. Unset means `~/.parley/parley.db`;
    /// `"memory"` keeps everything in process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// Session affinity and summarization policy
    #[serde(default)]
    pub session: SessionConfig,

    /// Prompt assembly limits
    #[serde(default)]
    pub context: ContextConfig,

    /// Tool loop bounds
    #[serde(default)]
    pub tool_loop: ToolLoopConfig,

    /// Sub-agent spawning
    #[serde(default)]
    pub spawn: SpawnConfig,

    /// Long-term memory backend
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Filesystem tool sandbox
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Agent profiles seeded into the store at startup
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<AgentProfile>,

    /// Channel configurations seeded into the store at startup
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<ChannelConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("database_url", &self.database_url)
            .field("session", &self.session)
            .field("context", &self.context)
            .field("tool_loop", &self.tool_loop)
            .field("spawn", &self.spawn)
            .field("memory", &self.memory)
            .field("workspace", &self.workspace)
            .field("providers", &self.providers)
            .field("agents", &self.agents.len())
            .field("channels", &self.channels.len())
            .finish()
    }
}

/// Provider endpoint settings.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// A conversation stays active this long after its last message
    #[serde(default = "default_activity_window")]
    pub activity_window_minutes: u32,

    /// Summarize once the message count goes above this
    #[serde(default = "default_summary_threshold")]
    pub summary_threshold: u32,

    /// Messages fed to the summarizer
    #[serde(default = "default_summary_window")]
    pub summary_window: usize,
}

fn default_activity_window() -> u32 {
    30
}
fn default_summary_threshold() -> u32 {
    20
}
fn default_summary_window() -> usize {
    30
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            activity_window_minutes: default_activity_window(),
            summary_threshold: default_summary_threshold(),
            summary_window: default_summary_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_history_limit_with_tools")]
    pub history_limit_with_tools: usize,

    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Longer history messages are clipped
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,

    #[serde(default = "default_max_prior_summaries")]
    pub max_prior_summaries: usize,

    #[serde(default = "default_recall_top_k")]
    pub recall_top_k: usize,

    #[serde(default = "default_recall_min_similarity")]
    pub recall_min_similarity: f32,

    #[serde(default = "default_agent_cache_ttl")]
    pub agent_cache_ttl_secs: u64,
}

fn default_history_limit_with_tools() -> usize {
    10
}
fn default_history_limit() -> usize {
    30
}
fn default_max_message_chars() -> usize {
    4000
}
fn default_max_prior_summaries() -> usize {
    3
}
fn default_recall_top_k() -> usize {
    5
}
fn default_recall_min_similarity() -> f32 {
    0.3
}
fn default_agent_cache_ttl() -> u64 {
    60
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            history_limit_with_tools: default_history_limit_with_tools(),
            history_limit: default_history_limit(),
            max_message_chars: default_max_message_chars(),
            max_prior_summaries: default_max_prior_summaries(),
            recall_top_k: default_recall_top_k(),
            recall_min_similarity: default_recall_min_similarity(),
            agent_cache_ttl_secs: default_agent_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolLoopConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_max_output_chars() -> usize {
    20_000
}

impl Default for ToolLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_output_chars: default_max_output_chars(),
        }
    }
}

/// Hard ceiling for any sub-agent timeout.
pub const SPAWN_TIMEOUT_CEILING_SECS: u64 = 600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnConfig {
    #[serde(default = "default_spawn_timeout")]
    pub default_timeout_secs: u64,

    #[serde(default = "default_spawn_cap")]
    pub max_timeout_secs: u64,
}

fn default_spawn_timeout() -> u64 {
    120
}
fn default_spawn_cap() -> u64 {
    SPAWN_TIMEOUT_CEILING_SECS
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_spawn_timeout(),
            max_timeout_secs: default_spawn_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "sqlite", "in_memory" or "none"
    #[serde(default = "default_memory_backend")]
    pub backend: String,
}

fn default_memory_backend() -> String {
    "sqlite".into()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Root for per-agent file sandboxes. Unset means `~/.parley/workspace`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.parley/config.toml).
    ///
    /// Also checks environment variables:
    /// - `PARLEY_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `PARLEY_PROVIDER`, `PARLEY_MODEL`, `PARLEY_DATABASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load a specific file, then apply the environment overrides.
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
        if self.api_key.is_none() {
            self.api_key = std::env::var("PARLEY_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("PARLEY_PROVIDER") {
            self.default_provider = provider;
        }

        if let Ok(model) = std::env::var("PARLEY_MODEL") {
            self.default_model = model;
        }

        if let Ok(url) = std::env::var("PARLEY_DATABASE_URL") {
            self.database_url = Some(url);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".parley")
    }

    /// The filesystem tool root.
    pub fn workspace_dir(&self) -> PathBuf {
        self.workspace
            .root
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("workspace"))
    }

    /// The database URL, defaulting to a file in the config directory.
    pub fn database_url(&self) -> String {
        self.database_url.clone().unwrap_or_else(|| {
            format!("sqlite://{}", Self::config_dir().join("parley.db").display())
        })
    }

    /// Whether persistence should stay in process.
    pub fn uses_in_memory_store(&self) -> bool {
        matches!(self.database_url.as_deref(), Some("memory") | Some(":memory:"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.tool_loop.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "tool_loop.max_iterations must be at least 1".into(),
            ));
        }

        if self.tool_loop.max_output_chars == 0 || self.context.max_message_chars == 0 {
            return Err(ConfigError::ValidationError(
                "output and message character limits must be > 0".into(),
            ));
        }

        if self.spawn.max_timeout_secs > SPAWN_TIMEOUT_CEILING_SECS {
            return Err(ConfigError::ValidationError(format!(
                "spawn.max_timeout_secs ({}) exceeds {SPAWN_TIMEOUT_CEILING_SECS}",
                self.spawn.max_timeout_secs
            )));
        }

        if self.spawn.default_timeout_secs > self.spawn.max_timeout_secs {
            return Err(ConfigError::ValidationError(format!(
                "spawn.default_timeout_secs ({}) exceeds spawn.max_timeout_secs ({})",
                self.spawn.default_timeout_secs, self.spawn.max_timeout_secs
            )));
        }

        if !(0.0..=1.0).contains(&self.context.recall_min_similarity) {
            return Err(ConfigError::ValidationError(
                "context.recall_min_similarity must be between 0.0 and 1.0".into(),
            ));
        }

        if let Some(channel) = self.channels.iter().find(|c| {
            !c.agent_id.is_empty() && !self.agents.is_empty() && !self.agents.iter().any(|a| a.id == c.agent_id)
        }) {
            return Err(ConfigError::ValidationError(format!(
                "channel '{}' references unknown agent '{}'",
                channel.id, channel.agent_id
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            database_url: None,
            session: SessionConfig::default(),
            context: ContextConfig::default(),
            tool_loop: ToolLoopConfig::default(),
            spawn: SpawnConfig::default(),
            memory: MemoryConfig::default(),
            workspace: WorkspaceConfig::default(),
            providers: HashMap::new(),
            agents: vec![],
            channels: vec![],
        }
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
