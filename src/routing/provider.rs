// Known upstream providers
// Author: kelexine (https://github.com/kelexine)

use super::EndpointKind;
use std::fmt;

/// Closed set of upstream providers. Resolved once from configuration;
/// nothing downstream of the resolver branches on provider names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenRouter,
    OpenAI,
    Together,
    Groq,
    Deepseek,
    GLM,
    Custom,
}

impl Provider {
    pub const ALL: [Provider; 7] = [
        Provider::OpenRouter,
        Provider::OpenAI,
        Provider::Together,
        Provider::Groq,
        Provider::Deepseek,
        Provider::GLM,
        Provider::Custom,
    ];

    /// Parse a configured provider identifier. Case-insensitive.
    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim().to_ascii_lowercase().as_str() {
            "openrouter" => Some(Provider::OpenRouter),
            "openai" => Some(Provider::OpenAI),
            "together" | "togetherai" | "together-ai" => Some(Provider::Together),
            "groq" => Some(Provider::Groq),
            "deepseek" => Some(Provider::Deepseek),
            "glm" | "zhipu" | "zai" => Some(Provider::GLM),
            "custom" => Some(Provider::Custom),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Provider::OpenRouter => "openrouter",
            Provider::OpenAI => "openai",
            Provider::Together => "together",
            Provider::Groq => "groq",
            Provider::Deepseek => "deepseek",
            Provider::GLM => "glm",
            Provider::Custom => "custom",
        }
    }

    /// Default base URL, `None` for `Custom`.
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Provider::OpenRouter => Some("https://openrouter.ai/api/v1"),
            Provider::OpenAI => Some("https://api.openai.com/v1"),
            Provider::Together => Some("https://api.together.xyz/v1"),
            Provider::Groq => Some("https://api.groq.com/openai/v1"),
            Provider::Deepseek => Some("https://api.deepseek.com/anthropic"),
            Provider::GLM => Some("https://api.z.ai/api/anthropic"),
            Provider::Custom => None,
        }
    }

    /// Infer a provider from a host name. Unknown hosts are `Custom`.
    pub fn from_host(host: &str) -> Self {
        let host = host.to_ascii_lowercase();
        let matches = |domain: &str| host == domain || host.ends_with(&format!(".{}", domain));

        if matches("openrouter.ai") {
            Provider::OpenRouter
        } else if matches("openai.com") {
            Provider::OpenAI
        } else if matches("together.xyz") || matches("together.ai") {
            Provider::Together
        } else if matches("groq.com") {
            Provider::Groq
        } else if matches("deepseek.com") {
            Provider::Deepseek
        } else if matches("z.ai") || matches("bigmodel.cn") {
            Provider::GLM
        } else {
            Provider::Custom
        }
    }

    /// Extra headers the provider expects on every call.
    pub fn extra_headers(&self) -> Vec<(String, String)> {
        match self {
            Provider::OpenRouter => vec![
                (
                    "HTTP-Referer".to_string(),
                    "https://github.com/kelexine/throne-proxy".to_string(),
                ),
                ("X-Title".to_string(), "throne-proxy".to_string()),
            ],
            _ => Vec::new(),
        }
    }

    /// Model-listing URL candidates for a base URL, tried in order.
    /// Only `Custom` endpoints need probing; known providers have one path.
    pub fn models_url_candidates(&self, base_url: &str, kind: EndpointKind) -> Vec<String> {
        let base = base_url.trim_end_matches('/');
        match (self, kind) {
            (_, EndpointKind::AnthropicNative) => vec![format!("{}/v1/models", base)],
            (Provider::Custom, EndpointKind::OpenAICompatible) => vec![
                format!("{}/models", base),
                format!("{}/v1/models", base),
                format!("{}/openai/v1/models", base),
            ],
            _ => vec![format!("{}/models", base)],
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_id_round_trips() {
        for provider in Provider::ALL {
            assert_eq!(Provider::from_id(provider.id()), Some(provider));
        }
        assert_eq!(Provider::from_id("OpenRouter"), Some(Provider::OpenRouter));
        assert_eq!(Provider::from_id("mistral"), None);
    }

    #[test]
    fn test_from_host() {
        assert_eq!(Provider::from_host("openrouter.ai"), Provider::OpenRouter);
        assert_eq!(Provider::from_host("api.groq.com"), Provider::Groq);
        assert_eq!(Provider::from_host("open.bigmodel.cn"), Provider::GLM);
        assert_eq!(Provider::from_host("notopenai.com"), Provider::Custom);
        assert_eq!(Provider::from_host("localhost"), Provider::Custom);
    }

    #[test]
    fn test_custom_models_candidates() {
        let urls = Provider::Custom
            .models_url_candidates("http://localhost:8000/", EndpointKind::OpenAICompatible);
        assert_eq!(
            urls,
            vec![
                "http://localhost:8000/models",
                "http://localhost:8000/v1/models",
                "http://localhost:8000/openai/v1/models",
            ]
        );
    }
}
