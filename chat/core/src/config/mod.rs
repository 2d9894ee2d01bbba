//! TOML Configuration File Support
//!
//! Centralized configuration loading for the chat server and client,
//! supporting a TOML configuration file at `~/.config/folio-chat/chat.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (applied by the binaries through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! - `$XDG_CONFIG_HOME/folio-chat/chat.toml` (typically `~/.config/folio-chat/chat.toml`)
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! bind_addr = "0.0.0.0:3000"
//! environment = "production"
//! wire_format = "framed"
//!
//! [upstream]
//! mode = "assistant"
//! assistant_id = "asst_123"
//! idle_timeout_secs = 60
//!
//! [retrieval]
//! vector_store_id = "vs_123"
//! max_results = 50
//!
//! [session]
//! max_turns = 10
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{CompletionSettings, DEFAULT_BASE_URL};
use crate::policy::DEFAULT_MAX_TURNS;
use crate::retrieval::DEFAULT_MAX_RESULTS;
use crate::streaming::WireFormat;

/// Default listen address
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// Default idle timeout for upstream and response streams
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default cap on an inbound chat request body
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Enumerated Settings
// =============================================================================

/// Which upstream shape serves completions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamMode {
    /// Stateless chat completion; history is replayed each turn
    #[default]
    Completion,
    /// Stateful assistant thread and run
    Assistant,
}

impl fmt::Display for UpstreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Completion => "completion",
            Self::Assistant => "assistant",
        })
    }
}

impl FromStr for UpstreamMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "completion" | "stateless" => Ok(Self::Completion),
            "assistant" | "thread" => Ok(Self::Assistant),
            other => Err(format!("unknown upstream mode '{other}' (expected completion or assistant)")),
        }
    }
}

/// Deployment environment
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development; diagnostic endpoints enabled
    Development,
    /// Everything else
    #[default]
    Production,
}

impl Environment {
    /// Whether development-only endpoints are served
    #[must_use]
    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Development => "development",
            Self::Production => "production",
        })
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment '{other}' (expected development or production)")),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Server section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Listen address
    pub bind_addr: Option<String>,

    /// `development` or `production`
    pub environment: Option<String>,

    /// `raw` or `framed`
    pub wire_format: Option<String>,

    /// Maximum chat request body in bytes
    pub max_body_bytes: Option<usize>,
}

/// Upstream section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamToml {
    /// `completion` or `assistant`
    pub mode: Option<String>,

    /// Provider base URL
    pub base_url: Option<String>,

    /// Provider API key (prefer the environment)
    pub api_key: Option<String>,

    /// Completion model
    pub model: Option<String>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Reply length cap in tokens
    pub max_tokens: Option<u32>,

    /// System prompt override
    pub system_prompt: Option<String>,

    /// Assistant used in assistant mode
    pub assistant_id: Option<String>,

    /// Seconds without a delta before a stream is abandoned
    pub idle_timeout_secs: Option<u64>,
}

/// Retrieval section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalToml {
    /// Vector store searched for context
    pub vector_store_id: Option<String>,

    /// Maximum search results requested
    pub max_results: Option<u32>,
}

/// Session section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// Turns allowed per conversation
    pub max_turns: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// Server configuration section
    pub server: ServerToml,

    /// Upstream configuration section
    pub upstream: UpstreamToml,

    /// Retrieval configuration section
    pub retrieval: RetrievalToml,

    /// Session configuration section
    pub session: SessionToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved configuration for the chat service
///
/// Use [`load_config`] to load with proper priority handling, then
/// [`ConfigOverrides::apply`] for CLI flags and [`ChatConfig::validate`]
/// before serving.
#[derive(Clone, Debug)]
pub struct ChatConfig {
    /// Listen address
    pub bind_addr: SocketAddr,

    /// Deployment environment
    pub environment: Environment,

    /// Upstream shape
    pub mode: UpstreamMode,

    /// Provider base URL
    pub base_url: String,

    /// Provider API key
    pub api_key: Option<String>,

    /// Completion model and prompt settings
    pub completion: CompletionSettings,

    /// Assistant used in assistant mode
    pub assistant_id: Option<String>,

    /// Vector store searched for context (none disables retrieval)
    pub vector_store_id: Option<String>,

    /// Maximum search results requested
    pub max_results: u32,

    /// Turns allowed per conversation
    pub max_turns: usize,

    /// Seconds without a delta before a stream is abandoned
    pub idle_timeout: Duration,

    /// Maximum chat request body in bytes
    pub max_body_bytes: usize,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Explicitly configured wire format (see [`ChatConfig::wire_format`])
    wire_format: Option<WireFormat>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            environment: Environment::default(),
            mode: UpstreamMode::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            completion: CompletionSettings::default(),
            assistant_id: None,
            vector_store_id: None,
            max_results: DEFAULT_MAX_RESULTS,
            max_turns: DEFAULT_MAX_TURNS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            config_file_path: None,
            wire_format: None,
            source: ConfigSource::Default,
        }
    }
}

impl ChatConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Wire format in effect
    ///
    /// Unless set explicitly, completion mode answers raw and assistant mode
    /// answers framed (the thread token needs frames to travel in).
    #[must_use]
    pub fn wire_format(&self) -> WireFormat {
        self.wire_format.unwrap_or(match self.mode {
            UpstreamMode::Completion => WireFormat::RawText,
            UpstreamMode::Assistant => WireFormat::Framed,
        })
    }

    /// Set the wire format explicitly
    pub fn set_wire_format(&mut self, format: WireFormat) {
        self.wire_format = Some(format);
    }

    /// Check that the configuration can serve requests
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "max_turns must be at least 1".to_string(),
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "idle_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "an API key is required (set OPENAI_API_KEY)".to_string(),
            ));
        }
        if self.mode == UpstreamMode::Assistant {
            if self.wire_format() != WireFormat::Framed {
                return Err(ConfigError::ValidationError(
                    "assistant mode requires the framed wire format".to_string(),
                ));
            }
            if self.assistant_id.as_deref().map_or(true, |a| a.trim().is_empty()) {
                return Err(ConfigError::ValidationError(
                    "assistant mode requires an assistant id (set CHAT_ASSISTANT_ID)".to_string(),
                ));
            }
        }
        if !(0.0..=2.0).contains(&self.completion.temperature) {
            return Err(ConfigError::ValidationError(format!(
                "temperature {} is outside 0.0..=2.0",
                self.completion.temperature
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/folio-chat/chat.toml` or
/// `~/.config/folio-chat/chat.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("folio-chat").join("chat.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if a
/// value in it or in the environment is invalid. A missing config file is not
/// an error (defaults are used).
pub fn load_config() -> Result<ChatConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ChatConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration using `env` for environment lookups
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<ChatConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ChatConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ChatToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env)?;

    Ok(config)
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ConfigError::ValidationError(format!("{key}: {e}")))
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ChatConfig, toml: &ChatToml) -> Result<(), ConfigError> {
    // Server settings
    if let Some(ref addr) = toml.server.bind_addr {
        config.bind_addr = parse_value("server.bind_addr", addr)?;
    }
    if let Some(ref environment) = toml.server.environment {
        config.environment = parse_value("server.environment", environment)?;
    }
    if let Some(ref format) = toml.server.wire_format {
        config.wire_format = Some(parse_value("server.wire_format", format)?);
    }
    if let Some(bytes) = toml.server.max_body_bytes {
        config.max_body_bytes = bytes;
    }

    // Upstream settings
    if let Some(ref mode) = toml.upstream.mode {
        config.mode = parse_value("upstream.mode", mode)?;
    }
    if let Some(ref url) = toml.upstream.base_url {
        config.base_url.clone_from(url);
    }
    if toml.upstream.api_key.is_some() {
        config.api_key.clone_from(&toml.upstream.api_key);
    }
    if let Some(ref model) = toml.upstream.model {
        config.completion.model.clone_from(model);
    }
    if let Some(temperature) = toml.upstream.temperature {
        config.completion.temperature = temperature;
    }
    if let Some(max_tokens) = toml.upstream.max_tokens {
        config.completion.max_tokens = max_tokens;
    }
    if let Some(ref prompt) = toml.upstream.system_prompt {
        config.completion.system_prompt.clone_from(prompt);
    }
    if toml.upstream.assistant_id.is_some() {
        config.assistant_id.clone_from(&toml.upstream.assistant_id);
    }
    if let Some(secs) = toml.upstream.idle_timeout_secs {
        config.idle_timeout = Duration::from_secs(secs);
    }

    // Retrieval settings
    if toml.retrieval.vector_store_id.is_some() {
        config.vector_store_id.clone_from(&toml.retrieval.vector_store_id);
    }
    if let Some(max_results) = toml.retrieval.max_results {
        config.max_results = max_results;
    }

    // Session settings
    if let Some(max_turns) = toml.session.max_turns {
        config.max_turns = max_turns;
    }

    Ok(())
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut ChatConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut from_env = false;
    let mut var = |key: &str| {
        let value = env(key).filter(|v| !v.trim().is_empty());
        from_env |= value.is_some();
        value
    };

    if let Some(addr) = var("CHAT_BIND_ADDR") {
        config.bind_addr = parse_value("CHAT_BIND_ADDR", &addr)?;
    }
    if let Some(format) = var("CHAT_WIRE_FORMAT") {
        config.wire_format = Some(parse_value("CHAT_WIRE_FORMAT", &format)?);
    }
    if let Some(environment) = var("CHAT_ENVIRONMENT") {
        config.environment = parse_value("CHAT_ENVIRONMENT", &environment)?;
    }
    if let Some(mode) = var("CHAT_UPSTREAM_MODE") {
        config.mode = parse_value("CHAT_UPSTREAM_MODE", &mode)?;
    }
    if let Some(model) = var("CHAT_MODEL") {
        config.completion.model = model;
    }
    if let Some(assistant) = var("CHAT_ASSISTANT_ID") {
        config.assistant_id = Some(assistant);
    }
    if let Some(store) = var("CHAT_VECTOR_STORE_ID") {
        config.vector_store_id = Some(store);
    }
    if let Some(turns) = var("CHAT_MAX_TURNS") {
        config.max_turns = parse_value("CHAT_MAX_TURNS", &turns)?;
    }
    if let Some(secs) = var("CHAT_IDLE_TIMEOUT_SECS") {
        config.idle_timeout = Duration::from_secs(parse_value("CHAT_IDLE_TIMEOUT_SECS", &secs)?);
    }
    if let Some(key) = var("OPENAI_API_KEY") {
        config.api_key = Some(key);
    }
    if let Some(url) = var("OPENAI_BASE_URL") {
        config.base_url = url;
    }

    if from_env {
        config.source = ConfigSource::Env;
    }
    Ok(())
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Listen address override
    pub bind_addr: Option<SocketAddr>,

    /// Wire format override
    pub wire_format: Option<WireFormat>,

    /// Environment override
    pub environment: Option<Environment>,

    /// Upstream mode override
    pub mode: Option<UpstreamMode>,

    /// Model override
    pub model: Option<String>,

    /// Turn cap override
    pub max_turns: Option<usize>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set listen address override
    #[must_use]
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = Some(addr);
        self
    }

    /// Set wire format override
    #[must_use]
    pub fn with_wire_format(mut self, format: WireFormat) -> Self {
        self.wire_format = Some(format);
        self
    }

    /// Set environment override
    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Set upstream mode override
    #[must_use]
    pub fn with_mode(mut self, mode: UpstreamMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set model override
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    /// Set turn cap override
    #[must_use]
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ChatConfig) {
        if self.bind_addr.is_some()
            || self.wire_format.is_some()
            || self.environment.is_some()
            || self.mode.is_some()
            || self.model.is_some()
            || self.max_turns.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(addr) = self.bind_addr {
            config.bind_addr = addr;
        }
        if let Some(format) = self.wire_format {
            config.wire_format = Some(format);
        }
        if let Some(environment) = self.environment {
            config.environment = environment;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(ref model) = self.model {
            config.completion.model.clone_from(model);
        }
        if let Some(max_turns) = self.max_turns {
            config.max_turns = max_turns;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
