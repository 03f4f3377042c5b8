//! Configuration data structures for throne-proxy.
//!
//! This module defines the schema for the application settings: server
//! parameters, the upstream provider and its credential, model mapping,
//! capability profiles and the retry budget.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::routing::EndpointKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The root configuration object for the application.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// HTTP server settings (host, port, workers).
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream provider selection and credential.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Claude model id → backend model id mapping.
    #[serde(default)]
    pub models: ModelMappingConfig,

    /// Operator capability profiles, consulted before the built-in table.
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,

    /// Retry, backoff and timeout budget for outbound calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Logging and observability settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Performance and resource management settings.
    #[serde(default)]
    pub performance: PerformanceConfig,
}

/// Settings for the built-in HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The IP address or hostname the server should bind to.
    /// Default: `127.0.0.1`
    #[serde(default = "default_host")]
    pub host: String,

    /// The port number the server should listen on.
    /// Default: `3000`
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads for the tokio runtime.
    /// Default: Number of logical CPU cores.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

/// Settings for the upstream backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Provider identifier (`openrouter`, `openai`, `together`, `groq`,
    /// `deepseek`, `glm`, `custom`).
    /// Default: `openrouter`
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Explicit base URL. Required for `custom`, optional otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Opaque provider credential, injected as the auth header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<SecretString>,

    /// Exact base URL → endpoint kind overrides. Checked before heuristics.
    #[serde(default)]
    pub endpoint_overrides: HashMap<String, EndpointKind>,
}

/// Backend model ids used in place of the Claude ids clients send.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelMappingConfig {
    /// Model used for opus/sonnet requests and any request with thinking enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_model: Option<String>,

    /// Model used for haiku requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitiesConfig {
    /// Profiles in precedence order. Declare specific patterns first.
    #[serde(default)]
    pub profiles: Vec<ProfileConfig>,

    /// Append the built-in profile table after the operator profiles.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub use_builtin: bool,
}

/// One capability profile as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Case-insensitive glob (`*`, `?`) matched against the backend model id.
    pub pattern: String,

    /// Use injected XML tool documentation instead of native function calling.
    #[serde(default)]
    pub xml_tools: bool,

    /// Transformer names in forward order.
    #[serde(default)]
    pub transformers: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Retry/budget controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Overall wall-clock budget for one logical outbound call, in seconds.
    /// Keep it at least as long as the slowest entry in the timeout table.
    /// Default: `300`
    #[serde(default = "default_budget_seconds")]
    pub budget_seconds: u64,

    /// First backoff interval in milliseconds. Later intervals double.
    /// Default: `1000`
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,

    /// Per-step backoff cap in milliseconds.
    /// Default: `30000`
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,

    /// Maximum attempts, including the first.
    /// Default: `5`
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Per-attempt timeouts by endpoint kind.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Per-attempt timeouts, in seconds. Completion timeouts bound the time to
/// response headers; the body of a stream is not subject to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Default: `60`
    #[serde(default = "default_anthropic_timeout")]
    pub anthropic_native_secs: u64,

    /// Default: `180`
    #[serde(default = "default_openai_timeout")]
    pub openai_compatible_secs: u64,

    /// Model listing timeout for either kind.
    /// Default: `15`
    #[serde(default = "default_models_timeout")]
    pub models_secs: u64,
}

/// Settings for application logging and output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum log level (`trace`, `debug`, `info`, `warn`, `error`).
    /// Default: `info`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format for logs (`pretty`, `json`).
    /// Default: `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Settings for tuning application performance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Maximum number of idle connections per host in the HTTP pool.
    /// Default: `32`
    #[serde(default = "default_pool_size")]
    pub connection_pool_size: usize,

    /// Maximum inbound request body, in megabytes.
    /// Default: `50`
    #[serde(default = "default_body_limit_mb")]
    pub request_body_limit_mb: usize,

    /// Seconds of upstream silence before a `ping` event is sent.
    /// Default: `15`
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_ping_secs: u64,
}

/// A credential that is wiped from memory on drop and never printed.
#[derive(Clone, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw secret. Only the outbound auth header should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl Serialize for SecretString {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: None,
            api_key: None,
            endpoint_overrides: HashMap::new(),
        }
    }
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            profiles: Vec::new(),
            use_builtin: true,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            budget_seconds: default_budget_seconds(),
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            max_attempts: default_max_attempts(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            anthropic_native_secs: default_anthropic_timeout(),
            openai_compatible_secs: default_openai_timeout(),
            models_secs: default_models_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            connection_pool_size: default_pool_size(),
            request_body_limit_mb: default_body_limit_mb(),
            keepalive_ping_secs: default_keepalive_secs(),
        }
    }
}

// Helper functions for serde defaults
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_provider() -> String {
    "openrouter".to_string()
}

fn default_true() -> bool {
    true
}

fn default_budget_seconds() -> u64 {
    300
}

fn default_initial_interval_ms() -> u64 {
    1000
}

fn default_max_interval_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_anthropic_timeout() -> u64 {
    60
}

fn default_openai_timeout() -> u64 {
    180
}

fn default_models_timeout() -> u64 {
    15
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_pool_size() -> usize {
    32
}

fn default_body_limit_mb() -> usize {
    50
}

fn default_keepalive_secs() -> u64 {
    15
}
