//! Configuration loading, validation, and management for Pincer.
//!
//! Loads configuration from `~/.pincer/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.pincer/config.toml`. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model call settings and turn limits
    #[serde(default)]
    pub agent: AgentConfig,

    /// Background history compaction
    #[serde(default)]
    pub summary: SummaryConfig,

    /// Per-sender admission control
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Session storage
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Directory holding IDENTITY.md and friends (defaults to `<config_dir>/workspace`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,

    /// Model context window in tokens
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Upper bound on model calls per turn
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,

    /// Maximum tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Reply used when the model produced no text
    #[serde(default = "default_response")]
    pub default_response: String,
}

fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_context_window() -> usize {
    8192
}
fn default_max_tool_iterations() -> usize {
    20
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_temperature() -> f32 {
    0.7
}
fn default_response() -> String {
    "I've completed processing but have no response to give.".into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            context_window: default_context_window(),
            max_tool_iterations: default_max_tool_iterations(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            default_response: default_response(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Compact once history holds more than this many messages
    #[serde(default = "default_message_threshold")]
    pub message_threshold: usize,

    /// ...or once estimated history tokens exceed this share of the context window
    #[serde(default = "default_token_ratio_percent")]
    pub token_ratio_percent: usize,

    /// Messages kept verbatim after compaction
    #[serde(default = "default_keep_last")]
    pub keep_last: usize,

    /// Summarize in two halves plus a merge above this many messages
    #[serde(default = "default_split_threshold")]
    pub split_threshold: usize,

    #[serde(default = "default_summary_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_summary_temperature")]
    pub temperature: f32,

    /// Deadline for one whole compaction job
    #[serde(default = "default_summary_timeout")]
    pub timeout_secs: u64,
}

fn default_message_threshold() -> usize {
    20
}
fn default_token_ratio_percent() -> usize {
    75
}
fn default_keep_last() -> usize {
    4
}
fn default_split_threshold() -> usize {
    10
}
fn default_summary_max_tokens() -> u32 {
    1024
}
fn default_summary_temperature() -> f32 {
    0.3
}
fn default_summary_timeout() -> u64 {
    120
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            message_threshold: default_message_threshold(),
            token_ratio_percent: default_token_ratio_percent(),
            keep_last: default_keep_last(),
            split_threshold: default_split_threshold(),
            max_tokens: default_summary_max_tokens(),
            temperature: default_summary_temperature(),
            timeout_secs: default_summary_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requests admitted per key within one window
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Per-key `max_requests` overrides (e.g. `"user:1" = 100`)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub overrides: HashMap<String, usize>,
}

fn default_true() -> bool {
    true
}
fn default_max_requests() -> usize {
    10
}
fn default_window_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            overrides: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default)]
    pub backend: SessionBackend,

    /// Where the file backend keeps one JSON file per session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from the default location.
    ///
    /// Environment variable overrides:
    /// - `PINCER_CONFIG_DIR` — config directory instead of `~/.pincer`
    /// - `PINCER_MODEL` — default model
    /// - `PINCER_MAX_ITERATIONS` — tool-iteration bound
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
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

    /// Apply overrides from an environment lookup, then re-validate.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("PINCER_MODEL").filter(|m| !m.trim().is_empty()) {
            self.agent.model = model;
        }
        if let Some(raw) = lookup("PINCER_MAX_ITERATIONS") {
            self.agent.max_tool_iterations = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("PINCER_MAX_ITERATIONS is not a number: {raw}"))
            })?;
        }
        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        std::env::var("PINCER_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs_home().join(".pincer"))
    }

    /// The directory identity files are read from.
    pub fn workspace_dir(&self) -> PathBuf {
        self.workspace
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("workspace"))
    }

    /// The directory the file session backend writes to.
    pub fn sessions_dir(&self) -> PathBuf {
        self.sessions
            .dir
            .clone()
            .unwrap_or_else(|| self.workspace_dir().join("sessions"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let temperatures = [
            ("agent.temperature", self.agent.temperature),
            ("summary.temperature", self.summary.temperature),
        ];
        for (name, value) in temperatures {
            if !(0.0..=2.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be between 0.0 and 2.0"
                )));
            }
        }

        if self.agent.context_window == 0 {
            return Err(ConfigError::ValidationError("agent.context_window must be > 0".into()));
        }

        if self.agent.max_tool_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_iterations must be at least 1".into(),
            ));
        }

        if self.summary.keep_last == 0 {
            return Err(ConfigError::ValidationError("summary.keep_last must be at least 1".into()));
        }

        if !(1..=100).contains(&self.summary.token_ratio_percent) {
            return Err(ConfigError::ValidationError(
                "summary.token_ratio_percent must be between 1 and 100".into(),
            ));
        }

        if self.rate_limit.enabled && (self.rate_limit.max_requests == 0 || self.rate_limit.window_secs == 0) {
            return Err(ConfigError::ValidationError(
                "rate_limit.max_requests and rate_limit.window_secs must be > 0 when enabled".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
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
