//! Configuration loading, validation, and management for wardops.
//!
//! Loads configuration from `~/.wardops/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.wardops/config.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the completion provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Completion provider endpoint and model ladder
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Orchestrator limits and retry policy
    #[serde(default)]
    pub agent: AgentConfig,

    /// Task synchronization timings
    #[serde(default)]
    pub sync: SyncConfig,
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
            .field("provider", &self.provider)
            .field("agent", &self.agent)
            .field("sync", &self.sync)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of an OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// The model ladder: primary first, then fallbacks in order
    #[serde(default = "default_models")]
    pub models: Vec<String>,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_models() -> Vec<String> {
    vec![
        "openai/gpt-4o-mini".into(),
        "anthropic/claude-3.5-haiku".into(),
        "meta-llama/llama-3.1-70b-instruct".into(),
    ]
}
fn default_request_timeout() -> u64 {
    60
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            models: default_models(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Prior messages kept when building a request
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Completion round-trips allowed per turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Per-message content cap (characters)
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,

    /// Retries of the same model on server errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Replaces the built-in ward assistant instructions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_history_limit() -> usize {
    10
}
fn default_max_iterations() -> u32 {
    10
}
fn default_max_content_chars() -> usize {
    100_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_backoff_max_ms() -> u64 {
    8_000
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1024
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            max_iterations: default_max_iterations(),
            max_content_chars: default_max_content_chars(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How long the push channel has to confirm before polling starts
    #[serde(default = "default_fallback_timeout")]
    pub fallback_timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Progress projection tick
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,

    /// How long finished tasks stay visible
    #[serde(default = "default_grace_millis")]
    pub grace_millis: u64,
}

fn default_fallback_timeout() -> u64 {
    5
}
fn default_poll_interval() -> u64 {
    3
}
fn default_tick_millis() -> u64 {
    1_000
}
fn default_grace_millis() -> u64 {
    2_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fallback_timeout_secs: default_fallback_timeout(),
            poll_interval_secs: default_poll_interval(),
            tick_millis: default_tick_millis(),
            grace_millis: default_grace_millis(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.wardops/config.toml).
    ///
    /// Environment variables override the file:
    /// - `WARDOPS_API_KEY`, then `OPENROUTER_API_KEY`, then `OPENAI_API_KEY`
    /// - `WARDOPS_BASE_URL`
    /// - `WARDOPS_MODELS` (comma separated ladder)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
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

    /// Apply overrides from an environment lookup (highest priority).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("WARDOPS_API_KEY")
                .or_else(|| lookup("OPENROUTER_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(url) = lookup("WARDOPS_BASE_URL") {
            self.provider.base_url = url;
        }

        if let Some(models) = lookup("WARDOPS_MODELS") {
            let ladder: Vec<String> = models
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect();
            if !ladder.is_empty() {
                self.provider.models = ladder;
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".wardops")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.models.iter().all(|m| m.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "provider.models must name at least one model".into(),
            ));
        }

        if !(0.0..=2.0).contains(&self.agent.temperature) {
            return Err(ConfigError::ValidationError(
                "agent.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.history_limit == 0
            || self.agent.max_iterations == 0
            || self.agent.max_content_chars == 0
        {
            return Err(ConfigError::ValidationError(
                "agent.history_limit, max_iterations and max_content_chars must be > 0".into(),
            ));
        }

        if self.agent.backoff_base_ms > self.agent.backoff_max_ms {
            return Err(ConfigError::ValidationError(
                "agent.backoff_base_ms must not exceed backoff_max_ms".into(),
            ));
        }

        if self.sync.poll_interval_secs == 0 || self.sync.tick_millis == 0 {
            return Err(ConfigError::ValidationError(
                "sync.poll_interval_secs and tick_millis must be > 0".into(),
            ));
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.history_limit, 10);
        assert_eq!(config.agent.max_iterations, 10);
        assert_eq!(config.sync.fallback_timeout_secs, 5);
        assert_eq!(config.provider.models.len(), 3);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.provider.models, config.provider.models);
        assert_eq!(parsed.sync.grace_millis, config.sync.grace_millis);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
[provider]
models = ["only-model"]

[sync]
poll_interval_secs = 10
"#,
        )
        .unwrap();
        assert_eq!(parsed.provider.models, vec!["only-model".to_string()]);
        assert_eq!(parsed.sync.poll_interval_secs, 10);
        assert_eq!(parsed.sync.fallback_timeout_secs, 5);
        assert_eq!(parsed.agent.max_retries, 3);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.agent.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_ladder_rejected() {
        let mut config = AppConfig::default();
        config.provider.models = vec![];
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_backoff_rejected() {
        let mut config = AppConfig::default();
        config.agent.backoff_base_ms = 10_000;
        config.agent.backoff_max_ms = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.provider.base_url, "https://openrouter.ai/api/v1");
    }

    #[test]
    fn load_from_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent]\nmax_retries = 1\n").unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.agent.max_retries, 1);
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OPENROUTER_API_KEY", "sk-or-test"),
            ("WARDOPS_MODELS", "a, b ,,c"),
            ("WARDOPS_BASE_URL", "http://localhost:8080/v1"),
        ]);
        let mut config = AppConfig::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.api_key.as_deref(), Some("sk-or-test"));
        assert_eq!(config.provider.models, vec!["a", "b", "c"]);
        assert_eq!(config.provider.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn file_api_key_wins_over_env() {
        let mut config = AppConfig {
            api_key: Some("from-file".into()),
            ..AppConfig::default()
        };
        config.apply_env_overrides(|_| Some("from-env".into()));
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let out = format!("{config:?}");
        assert!(!out.contains("sk-secret"));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("openrouter.ai"));
        assert!(toml_str.contains("poll_interval_secs"));
    }
}
