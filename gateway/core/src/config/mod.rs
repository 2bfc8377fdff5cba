//! Gateway Configuration
//!
//! Configuration is an explicit value object, loaded once and handed to
//! constructors. Nothing in the crate reads global configuration state.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. Environment variables (`GATEWAY_*`)
//! 2. TOML configuration file
//! 3. Default values
//!
//! The default file lives at `$XDG_CONFIG_HOME/edge-gateway/gateway.toml`
//! (typically `~/.config/edge-gateway/gateway.toml`).
//!
//! # Example Configuration
//!
//! ```toml
//! [controller]
//! enabled = true
//! humidity_floor = 30.0
//! humidity_ceiling = 50.0
//! nominal_humidity = 40.0
//! max_time_past_threshold_secs = 300
//!
//! [conversation]
//! enabled = true
//! verbose_tool_executions = false
//! randomness = 0.5
//!
//! [telemetry]
//! enabled = true
//! poll_cycle_secs = 60
//! location_id = "gateway-01"
//!
//! [assistant]
//! host = "localhost"
//! port = 8000
//! request_timeout_secs = 5
//!
//! [collaborators]
//! enable_pubsub = true
//! enable_persistence = false
//! enable_upstream = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::NOT_SET;

/// Spoken-response system prompt used for every completion request
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are generating a spoken response. Your response \
should as concise as possible. Responses should be plain text (no markdown). Your responses \
should be short and conversational: 100 words or less. Your response should contain no \
markdown syntax.";

/// Default telemetry poll cycle in seconds
pub const DEFAULT_POLL_CYCLE_SECS: u64 = 60;

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

/// Tracks where the configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Controller section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerToml {
    /// Whether humidity readings drive the humidifier
    pub enabled: Option<bool>,
    /// Lower hysteresis bound
    pub humidity_floor: Option<f32>,
    /// Upper hysteresis bound
    pub humidity_ceiling: Option<f32>,
    /// Target value sent with actuation commands
    pub nominal_humidity: Option<f32>,
    /// Debounce window in seconds
    pub max_time_past_threshold_secs: Option<u64>,
}

/// Conversation section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationToml {
    /// Whether speech is forwarded to the assistant
    pub enabled: Option<bool>,
    /// Speak assistant text alongside tool use and announce tool executions
    pub verbose_tool_executions: Option<bool>,
    /// System prompt override
    pub system_prompt: Option<String>,
    /// Sampling randomness
    pub randomness: Option<f32>,
    /// Utterance that clears the conversation
    pub reset_keyword: Option<String>,
    /// History limit in messages (0 = unlimited)
    pub max_history_messages: Option<usize>,
}

/// Telemetry section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryToml {
    /// Whether host telemetry is collected
    pub enabled: Option<bool>,
    /// Poll cycle in seconds (values <= 0 fall back to the default)
    pub poll_cycle_secs: Option<i64>,
    /// Location id stamped on telemetry records
    pub location_id: Option<String>,
}

/// Assistant backend section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantToml {
    /// Backend host
    pub host: Option<String>,
    /// Backend port
    pub port: Option<u16>,
    /// Per-request timeout in seconds
    pub request_timeout_secs: Option<u64>,
}

/// Collaborator enablement section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaboratorsToml {
    /// Use the pub/sub client when one is supplied
    pub enable_pubsub: Option<bool>,
    /// Use the persistence adapter when one is supplied
    pub enable_persistence: Option<bool>,
    /// Use the upstream client when one is supplied
    pub enable_upstream: Option<bool>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayToml {
    /// Controller section
    pub controller: ControllerToml,
    /// Conversation section
    pub conversation: ConversationToml,
    /// Telemetry section
    pub telemetry: TelemetryToml,
    /// Assistant backend section
    pub assistant: AssistantToml,
    /// Collaborator enablement section
    pub collaborators: CollaboratorsToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Environmental controller settings
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerConfig {
    /// Whether humidity readings drive the humidifier
    pub enabled: bool,
    /// Readings below this are out of band (low)
    pub humidity_floor: f32,
    /// Readings above this are out of band (high)
    pub humidity_ceiling: f32,
    /// Target value carried by actuation commands
    pub nominal_humidity: f32,
    /// How long a reading must stay out of band before actuation
    pub max_time_past_threshold: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            humidity_floor: 30.0,
            humidity_ceiling: 50.0,
            nominal_humidity: 40.0,
            max_time_past_threshold: Duration::from_secs(300),
        }
    }
}

/// Conversation manager settings
#[derive(Clone, Debug, PartialEq)]
pub struct ConversationConfig {
    /// Whether speech is forwarded to the assistant
    pub enabled: bool,
    /// Speak assistant text alongside tool use and announce tool executions
    pub verbose_tool_executions: bool,
    /// System prompt sent with every completion request
    pub system_prompt: String,
    /// Sampling randomness
    pub randomness: f32,
    /// Utterance that clears the conversation
    pub reset_keyword: String,
    /// History limit in messages (0 = unlimited)
    pub max_history_messages: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            verbose_tool_executions: false,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            randomness: 0.5,
            reset_keyword: "reset".to_string(),
            max_history_messages: 0,
        }
    }
}

/// System performance telemetry settings
#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryConfig {
    /// Whether host telemetry is collected
    pub enabled: bool,
    /// Interval between samples
    pub poll_cycle: Duration,
    /// Delay before the first sample
    pub initial_delay: Duration,
    /// Location id stamped on telemetry records
    pub location_id: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_cycle: Duration::from_secs(DEFAULT_POLL_CYCLE_SECS),
            initial_delay: Duration::from_secs(1),
            location_id: NOT_SET.to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Set the poll cycle from a raw second count, falling back to the default
    /// for values <= 0
    pub fn set_poll_cycle_secs(&mut self, secs: i64) {
        self.poll_cycle = match u64::try_from(secs) {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                tracing::warn!(
                    poll_cycle_secs = secs,
                    default = DEFAULT_POLL_CYCLE_SECS,
                    "Invalid poll cycle, using default"
                );
                Duration::from_secs(DEFAULT_POLL_CYCLE_SECS)
            }
        };
    }
}

/// Assistant backend connection settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssistantConfig {
    /// Backend host
    pub host: String,
    /// Backend port
    pub port: u16,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8000,
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl AssistantConfig {
    /// Base URL of the backend, with a trailing slash
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

/// Which supplied collaborators the gateway actually uses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollaboratorsConfig {
    /// Use the pub/sub client
    pub enable_pubsub: bool,
    /// Use the persistence adapter
    pub enable_persistence: bool,
    /// Use the upstream client
    pub enable_upstream: bool,
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self {
            enable_pubsub: true,
            enable_persistence: true,
            enable_upstream: true,
        }
    }
}

/// Complete gateway configuration
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GatewayConfig {
    /// Environmental controller settings
    pub controller: ControllerConfig,
    /// Conversation manager settings
    pub conversation: ConversationConfig,
    /// Telemetry settings
    pub telemetry: TelemetryConfig,
    /// Assistant backend settings
    pub assistant: AssistantConfig,
    /// Collaborator enablement
    pub collaborators: CollaboratorsConfig,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    source: Option<ConfigSource>,
}

impl GatewayConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source.unwrap_or(ConfigSource::Default)
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if the floor is not below the
    /// ceiling, if the nominal value lies outside `[floor, ceiling]`, or if
    /// randomness is outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.controller;
        if c.humidity_floor >= c.humidity_ceiling {
            return Err(ConfigError::ValidationError(format!(
                "humidity_floor ({}) must be below humidity_ceiling ({})",
                c.humidity_floor, c.humidity_ceiling
            )));
        }
        if c.nominal_humidity < c.humidity_floor || c.nominal_humidity > c.humidity_ceiling {
            return Err(ConfigError::ValidationError(format!(
                "nominal_humidity ({}) must lie within [{}, {}]",
                c.nominal_humidity, c.humidity_floor, c.humidity_ceiling
            )));
        }
        if !(0.0..=1.0).contains(&self.conversation.randomness) {
            return Err(ConfigError::ValidationError(format!(
                "randomness ({}) must lie within [0, 1]",
                self.conversation.randomness
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
/// Returns `$XDG_CONFIG_HOME/edge-gateway/gateway.toml` or
/// `~/.config/edge-gateway/gateway.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("edge-gateway").join("gateway.toml"))
}

/// Load configuration from the default path, then the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if the
/// resulting configuration is invalid. A missing file is not an error.
pub fn load_config() -> Result<GatewayConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// If `path` is `None`, only defaults and environment variables are used.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if the result
/// fails [`GatewayConfig::validate`].
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<GatewayConfig, ConfigError> {
    let mut config = GatewayConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_config = read_config_file(config_path)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = Some(ConfigSource::File);

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

    apply_env_config(&mut config, |key| std::env::var(key).ok());

    config.validate()?;
    Ok(config)
}

/// Parse a configuration from TOML text, without touching the environment
///
/// # Errors
///
/// Returns an error if the text is not valid TOML for the gateway schema or
/// the result fails validation.
pub fn parse_config(toml_text: &str) -> Result<GatewayConfig, ConfigError> {
    let toml_config: GatewayToml = toml::from_str(toml_text)?;
    let mut config = GatewayConfig::default();
    apply_toml_config(&mut config, &toml_config);
    config.source = Some(ConfigSource::File);
    config.validate()?;
    Ok(config)
}

// Startup-only, synchronous read.
fn read_config_file(path: &Path) -> Result<GatewayToml, ConfigError> {
    let toml_content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(toml::from_str(&toml_content)?)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut GatewayConfig, toml: &GatewayToml) {
    // Controller settings
    if let Some(enabled) = toml.controller.enabled {
        config.controller.enabled = enabled;
    }
    if let Some(floor) = toml.controller.humidity_floor {
        config.controller.humidity_floor = floor;
    }
    if let Some(ceiling) = toml.controller.humidity_ceiling {
        config.controller.humidity_ceiling = ceiling;
    }
    if let Some(nominal) = toml.controller.nominal_humidity {
        config.controller.nominal_humidity = nominal;
    }
    if let Some(secs) = toml.controller.max_time_past_threshold_secs {
        config.controller.max_time_past_threshold = Duration::from_secs(secs);
    }

    // Conversation settings
    if let Some(enabled) = toml.conversation.enabled {
        config.conversation.enabled = enabled;
    }
    if let Some(verbose) = toml.conversation.verbose_tool_executions {
        config.conversation.verbose_tool_executions = verbose;
    }
    if let Some(ref prompt) = toml.conversation.system_prompt {
        config.conversation.system_prompt.clone_from(prompt);
    }
    if let Some(randomness) = toml.conversation.randomness {
        config.conversation.randomness = randomness;
    }
    if let Some(ref keyword) = toml.conversation.reset_keyword {
        config.conversation.reset_keyword.clone_from(keyword);
    }
    if let Some(max) = toml.conversation.max_history_messages {
        config.conversation.max_history_messages = max;
    }

    // Telemetry settings
    if let Some(enabled) = toml.telemetry.enabled {
        config.telemetry.enabled = enabled;
    }
    if let Some(secs) = toml.telemetry.poll_cycle_secs {
        config.telemetry.set_poll_cycle_secs(secs);
    }
    if let Some(ref location) = toml.telemetry.location_id {
        config.telemetry.location_id.clone_from(location);
    }

    // Assistant settings
    if let Some(ref host) = toml.assistant.host {
        config.assistant.host.clone_from(host);
    }
    if let Some(port) = toml.assistant.port {
        config.assistant.port = port;
    }
    if let Some(secs) = toml.assistant.request_timeout_secs {
        config.assistant.request_timeout = Duration::from_secs(secs);
    }

    // Collaborators
    if let Some(enabled) = toml.collaborators.enable_pubsub {
        config.collaborators.enable_pubsub = enabled;
    }
    if let Some(enabled) = toml.collaborators.enable_persistence {
        config.collaborators.enable_persistence = enabled;
    }
    if let Some(enabled) = toml.collaborators.enable_upstream {
        config.collaborators.enable_upstream = enabled;
    }
}

fn parse_bool(value: &str) -> bool {
    value != "0" && !value.eq_ignore_ascii_case("false")
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut GatewayConfig, var: impl Fn(&str) -> Option<String>) {
    let mut touched = false;

    if let Some(floor) = var("GATEWAY_HUMIDITY_FLOOR").and_then(|v| v.parse().ok()) {
        config.controller.humidity_floor = floor;
        touched = true;
    }
    if let Some(ceiling) = var("GATEWAY_HUMIDITY_CEILING").and_then(|v| v.parse().ok()) {
        config.controller.humidity_ceiling = ceiling;
        touched = true;
    }
    if let Some(nominal) = var("GATEWAY_NOMINAL_HUMIDITY").and_then(|v| v.parse().ok()) {
        config.controller.nominal_humidity = nominal;
        touched = true;
    }
    if let Some(secs) = var("GATEWAY_MAX_TIME_PAST_THRESHOLD").and_then(|v| v.parse().ok()) {
        config.controller.max_time_past_threshold = Duration::from_secs(secs);
        touched = true;
    }
    if let Some(verbose) = var("GATEWAY_VERBOSE_TOOL_EXECUTIONS") {
        config.conversation.verbose_tool_executions = parse_bool(&verbose);
        touched = true;
    }
    if let Some(secs) = var("GATEWAY_POLL_CYCLE_SECS").and_then(|v| v.parse().ok()) {
        config.telemetry.set_poll_cycle_secs(secs);
        touched = true;
    }
    if let Some(location) = var("GATEWAY_LOCATION_ID") {
        config.telemetry.location_id = location;
        touched = true;
    }
    if let Some(host) = var("GATEWAY_ASSISTANT_HOST") {
        config.assistant.host = host;
        touched = true;
    }
    if let Some(port) = var("GATEWAY_ASSISTANT_PORT").and_then(|v| v.parse().ok()) {
        config.assistant.port = port;
        touched = true;
    }

    if touched {
        config.source = Some(ConfigSource::Env);
    }
}
