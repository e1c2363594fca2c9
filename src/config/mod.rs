pub mod validation;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use self::validation::validate_config;

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "Z2API_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// How upstream reasoning markup is rendered to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingMode {
    /// Rewrite `<details>` wrappers into neutral `<span>` wrappers.
    #[default]
    Think,
    /// Drop the `<details>` wrappers entirely.
    Strip,
    /// Leave the wrappers untouched. Unknown modes land here.
    #[serde(other)]
    Raw,
}

impl fmt::Display for ThinkingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThinkingMode::Think => write!(f, "think"),
            ThinkingMode::Strip => write!(f, "strip"),
            ThinkingMode::Raw => write!(f, "raw"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
    #[serde(default)]
    pub base_path: String,
}

fn default_port() -> u16 {
    8080
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    300
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout: default_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            runtime_worker_threads: None,
            base_path: String::new(),
        }
    }
}

/// Upstream chat service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Full URL of the upstream streaming chat endpoint.
    pub base_url: String,
    pub api_token: String,
    /// Upstream model used when the client model has no alias.
    pub default_model: String,
    /// Model ids advertised on `/v1/models`.
    #[serde(default)]
    pub models: Vec<String>,
    /// Client model id -> upstream model id.
    #[serde(default)]
    pub model_aliases: BTreeMap<String, String>,
    /// Static headers attached to every upstream request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_true")]
    pub enable_thinking: bool,
}

impl UpstreamConfig {
    /// Resolve the upstream model id for a client-facing model name.
    #[must_use]
    pub fn resolve_model<'a>(&'a self, client_model: &'a str) -> &'a str {
        if let Some(alias) = self.model_aliases.get(client_model) {
            return alias;
        }
        if client_model.is_empty() {
            return &self.default_model;
        }
        if self.models.iter().any(|m| m == client_model) {
            return client_model;
        }
        &self.default_model
    }
}

/// Client authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientAuthConfig {
    pub allowed_keys: Vec<String>,
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_true")]
    pub tool_support: bool,
    /// Maximum number of bytes the tool extractor scans.
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,
    #[serde(default)]
    pub thinking_mode: ThinkingMode,
    #[serde(default)]
    pub tool_prompt_template: Option<String>,
}

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_scan_limit() -> usize {
    200_000
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            tool_support: true,
            scan_limit: default_scan_limit(),
            thinking_mode: ThinkingMode::default(),
            tool_prompt_template: None,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub client_authentication: ClientAuthConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Resolve the config path from `Z2API_CONFIG`, falling back to `config.yaml`.
#[must_use]
pub fn config_path_from_env() -> String {
    std::env::var(CONFIG_PATH_ENV)
        .ok()
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] or [`ConfigError::Validation`].
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}
