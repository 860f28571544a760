//! Configuration loading, validation, and management for Midwire.
//!
//! Loads configuration from `~/.midwire/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.midwire/config.toml`. Constructed once at startup
/// and passed explicitly into the pipeline — never read from shared
/// mutable global state.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model backend configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Gateway (HTTP/WebSocket) configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Rate-limit ceilings and identity table sizing
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Tool-calling loop configuration
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Context augmentation configuration
    #[serde(default)]
    pub augmenter: AugmenterConfig,

    /// Semantic memory collaborator configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Persistent chat store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Tool enablement
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Graceful shutdown configuration
    #[serde(default)]
    pub shutdown: ShutdownConfig,
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
            .field("provider", &self.provider)
            .field("gateway", &self.gateway)
            .field("limits", &self.limits)
            .field("orchestrator", &self.orchestrator)
            .field("augmenter", &self.augmenter)
            .field("memory", &self.memory)
            .field("store", &self.store)
            .field("tools", &self.tools)
            .field("shutdown", &self.shutdown)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key for the hosted model backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the backend (OpenAI-compatible)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
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
fn default_request_timeout() -> u64 {
    120
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Whether to trust X-Forwarded-For headers for identity extraction.
    /// Only enable when running behind a proxy you control.
    #[serde(default)]
    pub trusted_proxy: bool,

    /// Process memory ceiling for the health endpoint, in MiB
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: u64,
}

fn default_port() -> u16 {
    41780
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_memory_limit_mb() -> u64 {
    1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            trusted_proxy: false,
            memory_limit_mb: default_memory_limit_mb(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Admitted requests per identity per minute
    #[serde(default = "default_per_minute")]
    pub per_minute: u32,

    /// Admitted requests per identity per hour
    #[serde(default = "default_per_hour")]
    pub per_hour: u32,

    /// Max identities tracked before least-recently-used eviction
    #[serde(default = "default_identity_capacity")]
    pub identity_capacity: usize,
}

fn default_per_minute() -> u32 {
    60
}
fn default_per_hour() -> u32 {
    600
}
fn default_identity_capacity() -> usize {
    4096
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            per_minute: default_per_minute(),
            per_hour: default_per_hour(),
            identity_capacity: default_identity_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum tool-call rounds per turn (clamped to 1..=9)
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Per-tool execution timeout in seconds
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Override the built-in system prompt entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,
}

fn default_max_rounds() -> u32 {
    5
}
fn default_tool_timeout() -> u64 {
    30
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            tool_timeout_secs: default_tool_timeout(),
            system_prompt_override: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmenterConfig {
    /// Max memory hits injected per turn
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,

    /// Semantic memory search timeout in seconds
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,
}

fn default_recall_limit() -> usize {
    5
}
fn default_search_timeout() -> u64 {
    3
}

impl Default for AugmenterConfig {
    fn default() -> Self {
        Self {
            recall_limit: default_recall_limit(),
            search_timeout_secs: default_search_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Backend: "in_memory" or "none"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// Whether completed turns are stored back into semantic memory
    #[serde(default = "default_true")]
    pub auto_save: bool,
}

fn default_memory_backend() -> String {
    "in_memory".into()
}
fn default_true() -> bool {
    true
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            auto_save: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend: "sqlite" or "in_memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// SQLite database path (ignored for in_memory)
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_backend() -> String {
    "sqlite".into()
}
fn default_store_path() -> String {
    "~/.midwire/chats.db".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Names of enabled tools. Empty = all built-ins enabled.
    #[serde(default)]
    pub enabled: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self { enabled: vec![] }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Seconds in-flight turns get to finish before forced close
    #[serde(default = "default_grace")]
    pub grace_secs: u64,
}

fn default_grace() -> u64 {
    10
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_secs: default_grace(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.midwire/config.toml).
    ///
    /// Environment variables take priority over file values:
    /// - `MIDWIRE_API_KEY` (falls back to `OPENAI_API_KEY`)
    /// - `MIDWIRE_MODEL`, `MIDWIRE_BASE_URL`
    /// - `MIDWIRE_PORT`, `MIDWIRE_TRUSTED_PROXY`
    /// - `MIDWIRE_RATE_PER_MINUTE`, `MIDWIRE_RATE_PER_HOUR`
    /// - `MIDWIRE_ENABLED_TOOLS` (comma-separated)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
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

    /// Apply environment variable overrides (highest priority).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("MIDWIRE_API_KEY") {
            self.provider.api_key = Some(key);
        } else if self.provider.api_key.is_none() {
            self.provider.api_key = std::env::var("OPENAI_API_KEY").ok();
        }

        if let Ok(model) = std::env::var("MIDWIRE_MODEL") {
            self.provider.model = model;
        }
        if let Ok(url) = std::env::var("MIDWIRE_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Ok(port) = std::env::var("MIDWIRE_PORT")
            && let Ok(port) = port.parse()
        {
            self.gateway.port = port;
        }
        if let Ok(trusted) = std::env::var("MIDWIRE_TRUSTED_PROXY") {
            self.gateway.trusted_proxy = trusted == "1" || trusted.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("MIDWIRE_RATE_PER_MINUTE")
            && let Ok(v) = v.parse()
        {
            self.limits.per_minute = v;
        }
        if let Ok(v) = std::env::var("MIDWIRE_RATE_PER_HOUR")
            && let Ok(v) = v.parse()
        {
            self.limits.per_hour = v;
        }
        if let Ok(tools) = std::env::var("MIDWIRE_ENABLED_TOOLS") {
            self.tools.enabled = tools
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".midwire")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.temperature < 0.0 || self.provider.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.limits.per_minute == 0 || self.limits.per_hour == 0 {
            return Err(ConfigError::ValidationError(
                "rate-limit ceilings must be greater than zero".into(),
            ));
        }

        if self.limits.per_hour < self.limits.per_minute {
            return Err(ConfigError::ValidationError(
                "limits.per_hour must be at least limits.per_minute".into(),
            ));
        }

        if !(1..=9).contains(&self.orchestrator.max_rounds) {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_rounds must be between 1 and 9".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
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
            provider: ProviderConfig::default(),
            gateway: GatewayConfig::default(),
            limits: LimitsConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            augmenter: AugmenterConfig::default(),
            memory: MemoryConfig::default(),
            store: StoreConfig::default(),
            tools: ToolsConfig::default(),
            shutdown: ShutdownConfig::default(),
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
