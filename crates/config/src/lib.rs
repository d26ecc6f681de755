//! Configuration loading, validation, and management for zaibridge.
//!
//! Loads configuration from `~/.zaibridge/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use zaibridge_core::wire::SamplingParams;

/// Default z.ai Anthropic-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.z.ai/api/anthropic";

/// The GLM-4 models the endpoint serves.
pub const MODELS: &[&str] = &[
    "glm-4-flash",
    "glm-4-plus",
    "glm-4-air",
    "glm-4-airx",
    "glm-4-long",
];

pub const RECOMMENDED_MODEL: &str = "glm-4-flash";
pub const RECOMMENDED_MAX_TOKENS: u32 = 3000;
pub const RECOMMENDED_TEMPERATURE: f32 = 1.0;

/// The root configuration structure.
///
/// Maps directly to `~/.zaibridge/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider base URL (the Messages API lives under `/v1/messages`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used when `recommended` is off
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Max tokens per response when `recommended` is off
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature when `recommended` is off
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Use the recommended model settings and ignore the three above
    #[serde(default = "default_true")]
    pub recommended: bool,

    /// Extra instructions prepended to the system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    /// Maximum provider round-trips per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// HTTP timeout for one provider request, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Identity of this configuration; keys the memory document
    #[serde(default = "default_entry_id")]
    pub entry_id: String,

    /// Memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}
fn default_chat_model() -> String {
    RECOMMENDED_MODEL.into()
}
fn default_max_tokens() -> u32 {
    RECOMMENDED_MAX_TOKENS
}
fn default_temperature() -> f32 {
    RECOMMENDED_TEMPERATURE
}
fn default_max_iterations() -> u32 {
    10
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_entry_id() -> String {
    "default".into()
}
fn default_true() -> bool {
    true
}

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
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("recommended", &self.recommended)
            .field("prompt", &self.prompt)
            .field("max_iterations", &self.max_iterations)
            .field("timeout_secs", &self.timeout_secs)
            .field("entry_id", &self.entry_id)
            .field("memory", &self.memory)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory for memory documents; defaults to `~/.zaibridge/storage`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<String>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            storage_dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.zaibridge/config.toml).
    ///
    /// Environment variables override the file:
    /// - `ZAIBRIDGE_API_KEY`, then `ZAI_API_KEY` (only if no key is configured)
    /// - `ZAIBRIDGE_BASE_URL`
    /// - `ZAIBRIDGE_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
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

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("ZAIBRIDGE_API_KEY").or_else(|| lookup("ZAI_API_KEY"));
        }

        if let Some(url) = lookup("ZAIBRIDGE_BASE_URL") {
            self.base_url = url;
        }

        // An explicit model choice switches off the recommended preset
        if let Some(model) = lookup("ZAIBRIDGE_MODEL") {
            self.chat_model = model;
            self.recommended = false;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".zaibridge")
    }

    /// Directory holding memory documents.
    pub fn storage_dir(&self) -> PathBuf {
        match &self.memory.storage_dir {
            Some(dir) => PathBuf::from(dir),
            None => Self::config_dir().join("storage"),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 1.0".into(),
            ));
        }

        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationError("max_tokens must be > 0".into()));
        }

        if self.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "max_iterations must be at least 1".into(),
            ));
        }

        if self.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError("base_url must not be empty".into()));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Model, max tokens, and temperature actually sent to the provider.
    ///
    /// With `recommended` on, the configured values are ignored.
    pub fn sampling_params(&self) -> SamplingParams {
        if self.recommended {
            SamplingParams {
                model: RECOMMENDED_MODEL.into(),
                max_tokens: RECOMMENDED_MAX_TOKENS,
                temperature: RECOMMENDED_TEMPERATURE,
            }
        } else {
            SamplingParams {
                model: self.chat_model.clone(),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            }
        }
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            recommended: true,
            prompt: None,
            max_iterations: default_max_iterations(),
            timeout_secs: default_timeout_secs(),
            entry_id: default_entry_id(),
            memory: MemoryConfig::default(),
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
