//! Configuration management for the Relay bridge.
//!
//! The bridge reads a single configuration file at `~/.relay/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (RELAY_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `RELAY_BACKEND_URL` → backend.base_url
//! - `RELAY_BACKEND_TOKEN` → backend.api_token
//! - `RELAY_SELF_NICKNAME` → engine.self_nickname
//! - `RELAY_LOG_LEVEL` → observability.log_level

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".relay"),
        |dirs| dirs.home_dir().join(".relay"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Backend Configuration (conversational API)
// ============================================================================

/// Conversational backend configuration.
///
/// The backend speaks a blocking chat-completion API: one request per
/// inbound message, one JSON reply carrying the answer and the
/// conversation id to reuse on the next turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend API, without the trailing endpoint path.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request.
    #[serde(default)]
    pub api_token: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl BackendConfig {
    /// Per-request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1/v1".into()
}

fn default_timeout_secs() -> u64 {
    60
}

// ============================================================================
// Engine Configuration (session handling)
// ============================================================================

/// Bridge engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Nickname of the bridge account inside the chat program.
    ///
    /// Group messages are only answered when they mention this name.
    #[serde(default = "default_self_nickname")]
    pub self_nickname: String,

    /// Maximum number of sessions kept open at once.
    #[serde(default = "default_max_open_sessions")]
    pub max_open_sessions: usize,

    /// Capacity of the conversation binding cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Number of concurrent backend request workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Session panel poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Session names that must never be admitted (system accounts etc.)
    #[serde(default)]
    pub filter_sessions: HashSet<String>,

    /// Session names to open unconditionally at startup.
    #[serde(default)]
    pub listen_sessions: Vec<String>,

    /// Tag names whose `<tag>...</tag>` blocks are stripped from answers.
    #[serde(default = "default_strip_tags")]
    pub strip_tags: Vec<String>,
}

impl EngineConfig {
    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            self_nickname: default_self_nickname(),
            max_open_sessions: default_max_open_sessions(),
            cache_capacity: default_cache_capacity(),
            workers: default_workers(),
            poll_interval_ms: default_poll_interval_ms(),
            filter_sessions: HashSet::new(),
            listen_sessions: Vec::new(),
            strip_tags: default_strip_tags(),
        }
    }
}

fn default_self_nickname() -> String {
    "relay".into()
}

fn default_max_open_sessions() -> usize {
    4
}

fn default_cache_capacity() -> usize {
    500
}

fn default_workers() -> usize {
    5
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_strip_tags() -> Vec<String> {
    vec!["think".into(), "details".into()]
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    /// Aliases: "level" for backward compatibility with existing config files
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    /// Aliases: "format" for backward compatibility with existing config files
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration for the Relay bridge.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Conversational backend settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Bridge engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Observability settings
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("RELAY_BACKEND_URL") {
            self.backend.base_url = url;
        }
        if let Ok(token) = std::env::var("RELAY_BACKEND_TOKEN") {
            self.backend.api_token = token;
        }
        if let Ok(nickname) = std::env::var("RELAY_SELF_NICKNAME") {
            self.engine.self_nickname = nickname;
        }
        if let Ok(level) = std::env::var("RELAY_LOG_LEVEL") {
            self.observability.log_level = level;
        }
    }
}
