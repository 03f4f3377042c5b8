// Configuration module
// Author: kelexine (https://github.com/kelexine)

mod models;

pub use models::*;

use crate::error::{ProxyError, Result};
use config::{Config, Environment, File};
use std::path::{Path, PathBuf};

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. CLI arguments (highest, applied by the caller)
    /// 2. Environment variables (`THRONE_PROXY__SECTION__KEY`)
    /// 3. Config file
    /// 4. Defaults (lowest)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_config_path);

        let config = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&Self::default())?)
            // An explicit --config path must exist; the default one may not
            .add_source(File::from(file_path).required(path.is_some()))
            .add_source(
                Environment::with_prefix("THRONE_PROXY")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .map_err(|e| ProxyError::Configuration(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| ProxyError::Configuration(e.to_string()))
    }

    fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".throne-proxy")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.upstream.provider, "openrouter");
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.capabilities.use_builtin);
        assert!(config.upstream.api_key.is_none());
    }

    #[test]
    fn test_default_budget_covers_every_attempt_timeout() {
        let retry = AppConfig::default().retry;
        let slowest = retry
            .timeouts
            .anthropic_native_secs
            .max(retry.timeouts.openai_compatible_secs)
            .max(retry.timeouts.models_secs);
        assert!(retry.budget_seconds >= slowest);
    }

    #[test]
    fn test_env_section_keys_use_double_separator() {
        let source = Environment::with_prefix("THRONE_PROXY")
            .prefix_separator("__")
            .separator("__")
            .source(Some(
                [
                    ("THRONE_PROXY__SERVER__PORT".to_string(), "4100".to_string()),
                    ("THRONE_PROXY_PROVIDER".to_string(), "groq".to_string()),
                ]
                .into_iter()
                .collect(),
            ));
        let config: AppConfig = Config::builder()
            .add_source(Config::try_from(&AppConfig::default()).unwrap())
            .add_source(source)
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.server.port, 4100);
        assert_eq!(config.upstream.provider, "openrouter");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[upstream]
provider = "custom"
base_url = "https://llm.internal/v1"
api_key = "sk-test-123"

[upstream.endpoint_overrides]
"https://llm.internal/v1" = "anthropic-native"

[[capabilities.profiles]]
pattern = "acme-*"
xml_tools = true
transformers = ["maxtoken"]
max_tokens = 4096
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.upstream.provider, "custom");
        assert_eq!(config.upstream.base_url.as_deref(), Some("https://llm.internal/v1"));
        assert_eq!(config.upstream.api_key.as_ref().unwrap().expose(), "sk-test-123");
        assert_eq!(
            config.upstream.endpoint_overrides.get("https://llm.internal/v1"),
            Some(&crate::routing::EndpointKind::AnthropicNative)
        );
        assert_eq!(config.capabilities.profiles.len(), 1);
        assert!(config.capabilities.profiles[0].xml_tools);
        assert_eq!(config.capabilities.profiles[0].max_tokens, Some(4096));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/throne.toml")));
        assert!(matches!(result, Err(ProxyError::Configuration(_))));
    }

    #[test]
    fn test_secret_is_redacted_in_debug() {
        let secret = SecretString::new("sk-very-secret");
        assert!(!format!("{:?}", secret).contains("sk-very-secret"));
    }
}
