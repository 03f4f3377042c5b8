//! Endpoint resolution.
//!
//! Turns the configured provider, base URL and override map into a single
//! immutable [`RoutingDescriptor`] that the rest of the gateway consumes.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod provider;
mod resolver;

pub use provider::Provider;
pub use resolver::resolve;

use crate::config::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a backend needs full translation or accepts Anthropic requests as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointKind {
    AnthropicNative,
    #[serde(rename = "openai-compatible")]
    OpenAICompatible,
}

impl EndpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKind::AnthropicNative => "anthropic-native",
            EndpointKind::OpenAICompatible => "openai-compatible",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to address one upstream. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct RoutingDescriptor {
    pub provider: Provider,
    pub base_url: String,
    pub endpoint_kind: EndpointKind,
    pub auth_header_name: &'static str,
    /// Listing URLs in probe order. The first entry is the canonical one.
    pub models_endpoint_urls: Vec<String>,
    pub extra_headers: Vec<(String, String)>,
    pub credential: Option<SecretString>,
}

impl RoutingDescriptor {
    pub fn models_endpoint_url(&self) -> &str {
        self.models_endpoint_urls
            .first()
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// URL for a completion call on this endpoint.
    pub fn completion_url(&self) -> String {
        match self.endpoint_kind {
            EndpointKind::OpenAICompatible => format!("{}/chat/completions", self.base_url),
            EndpointKind::AnthropicNative => format!("{}/v1/messages", self.base_url),
        }
    }

    pub fn count_tokens_url(&self) -> String {
        format!("{}/v1/messages/count_tokens", self.base_url)
    }

    /// Value of the auth header, `None` when no credential is configured.
    pub fn auth_header_value(&self) -> Option<String> {
        let secret = self.credential.as_ref()?;
        match self.endpoint_kind {
            EndpointKind::OpenAICompatible => Some(format!("Bearer {}", secret.expose())),
            EndpointKind::AnthropicNative => Some(secret.expose().to_string()),
        }
    }
}
