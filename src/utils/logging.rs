//! Structured logging and security-focused trace utilities.
//!
//! This module configures the `tracing` ecosystem for the gateway,
//! supporting multiple output formats and providing utilities to prevent
//! upstream credentials from leaking into logs.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::config::LoggingConfig;
use crate::error::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the global tracing subscriber for the application.
///
/// Supports two output formats:
/// - `json`: Structured JSON logs for production ingestion.
/// - `pretty` (default): Human-readable, colorized output for development.
///
/// Log levels are controlled via the `RUST_LOG` environment variable or
/// the provided `LoggingConfig`.
pub fn init(config: &LoggingConfig) -> Result<()> {
    // Configure filter from environment or config file
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

/// Sanitizes sensitive information from log messages.
///
/// Redacts API keys (`sk-…`, including `sk-ant-…` and `sk-or-…`) and the
/// value of any `Bearer` credential before the text reaches a log sink.
pub fn sanitize(input: &str) -> String {
    let mut result = input.to_string();

    // Pattern 1: Bearer credentials, whatever their shape
    result = redact(&result, "Bearer ", "[REDACTED_TOKEN]", true);

    // Pattern 2: provider API keys
    result = redact(&result, "sk-", "[REDACTED_API_KEY]", false);

    result
}

/// Replace every token that starts with `marker`.
fn redact(input: &str, marker: &str, replacement: &str, keep_marker: bool) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find(marker) {
        let token_start = pos + marker.len();
        let end = rest[token_start..]
            .find(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == ',')
            .map(|i| token_start + i)
            .unwrap_or(rest.len());

        out.push_str(&rest[..pos]);
        if end == token_start {
            out.push_str(marker);
        } else {
            if keep_marker {
                out.push_str(marker);
            }
            out.push_str(replacement);
        }
        rest = &rest[end..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_api_key() {
        let input = r#"{"api_key": "sk-or-v1-abc123def", "model": "x"}"#;
        let output = sanitize(input);
        assert!(output.contains("[REDACTED_API_KEY]"));
        assert!(!output.contains("abc123def"));
        assert!(output.contains(r#""model": "x""#));
    }

    #[test]
    fn test_sanitize_bearer_token() {
        let input = "Authorization: Bearer sk-live-999 and again Bearer abc.def";
        let output = sanitize(input);
        assert_eq!(output, "Authorization: Bearer [REDACTED_TOKEN] and again Bearer [REDACTED_TOKEN]");
    }

    #[test]
    fn test_sanitize_leaves_plain_text() {
        assert_eq!(sanitize("task-sk- nothing here"), "task-sk- nothing here");
        assert_eq!(sanitize("no secrets"), "no secrets");
    }
}
