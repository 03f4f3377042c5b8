//! Capability matching: model id → tool-calling mode and transformer set.
//!
//! Profiles are matched first-match-wins in declaration order. Operator
//! profiles from the config file come first, then the built-in table. More
//! specific patterns must be declared before general ones; the matcher never
//! reorders them.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::config::{CapabilitiesConfig, ProfileConfig};
use crate::error::{ProxyError, Result};
use crate::transform::TransformerKind;
use regex::Regex;
use tracing::debug;

/// Per-model behaviour selected by the matcher.
#[derive(Debug, Clone)]
pub struct CapabilityProfile {
    pub model_pattern: String,
    matcher: Option<Regex>,
    pub needs_xml_tools: bool,
    /// Transformers in forward order.
    pub transformers: Vec<TransformerKind>,
    pub max_tokens_override: Option<u32>,
}

impl CapabilityProfile {
    /// Compile a profile. Fails on unknown transformer names.
    pub fn new(
        pattern: &str,
        needs_xml_tools: bool,
        transformers: &[&str],
        max_tokens_override: Option<u32>,
    ) -> Result<Self> {
        let transformers = transformers
            .iter()
            .map(|name| {
                TransformerKind::from_name(name).ok_or_else(|| {
                    ProxyError::Configuration(format!(
                        "Unknown transformer '{}' in profile '{}'",
                        name, pattern
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            model_pattern: pattern.to_string(),
            matcher: Some(compile_glob(pattern)?),
            needs_xml_tools,
            transformers,
            max_tokens_override,
        })
    }

    /// Fallback when nothing matches: native tools, no transformers.
    pub fn default_profile() -> Self {
        Self {
            model_pattern: "*".to_string(),
            matcher: None,
            needs_xml_tools: false,
            transformers: Vec::new(),
            max_tokens_override: None,
        }
    }

    pub fn matches(&self, model: &str) -> bool {
        match &self.matcher {
            Some(regex) => regex.is_match(model),
            None => true,
        }
    }

    fn from_config(profile: &ProfileConfig) -> Result<Self> {
        let names: Vec<&str> = profile.transformers.iter().map(String::as_str).collect();
        Self::new(&profile.pattern, profile.xml_tools, &names, profile.max_tokens)
    }
}

/// Built-in profiles, most specific first.
const BUILTIN_PROFILES: &[(&str, bool, &[&str], Option<u32>)] = &[
    ("*deepseek-r1*", true, &["reasoning", "thinktags"], None),
    ("*deepseek*", false, &["reasoning", "maxtoken"], Some(8192)),
    ("*qwen*coder*", false, &["enhancetool"], None),
    ("*qwq*", true, &["thinktags"], None),
    ("*glm-4*", false, &["reasoning"], None),
    ("*kimi*", false, &["enhancetool"], None),
    ("*gpt-oss*", false, &["reasoning"], None),
    ("*gemma*", true, &["maxtoken"], Some(8192)),
];

/// Ordered, immutable profile table.
#[derive(Debug, Clone)]
pub struct CapabilityMatcher {
    profiles: Vec<CapabilityProfile>,
    fallback: CapabilityProfile,
}

impl CapabilityMatcher {
    pub fn new(profiles: Vec<CapabilityProfile>) -> Self {
        Self {
            profiles,
            fallback: CapabilityProfile::default_profile(),
        }
    }

    /// Compile operator profiles followed (optionally) by the built-in table.
    pub fn from_config(config: &CapabilitiesConfig) -> Result<Self> {
        let mut profiles = config
            .profiles
            .iter()
            .map(CapabilityProfile::from_config)
            .collect::<Result<Vec<_>>>()?;

        if config.use_builtin {
            profiles.extend(builtin_profiles()?);
        }

        debug!("Loaded {} capability profiles", profiles.len());
        Ok(Self::new(profiles))
    }

    /// First profile whose pattern matches, or the default profile.
    pub fn match_model(&self, model: &str) -> &CapabilityProfile {
        let profile = self
            .profiles
            .iter()
            .find(|p| p.matches(model))
            .unwrap_or(&self.fallback);
        debug!("Model '{}' matched profile '{}'", model, profile.model_pattern);
        profile
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

fn builtin_profiles() -> Result<Vec<CapabilityProfile>> {
    BUILTIN_PROFILES
        .iter()
        .map(|(pattern, xml, transformers, max_tokens)| {
            CapabilityProfile::new(pattern, *xml, transformers, *max_tokens)
        })
        .collect()
}

/// Compile a case-insensitive, anchored glob (`*`, `?`) into a regex.
fn compile_glob(pattern: &str) -> Result<Regex> {
    if pattern.trim().is_empty() {
        return Err(ProxyError::Configuration(
            "Capability profile pattern must not be empty".to_string(),
        ));
    }

    let mut source = String::from("(?i)^");
    for c in pattern.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');

    Regex::new(&source).map_err(|e| {
        ProxyError::Configuration(format!("Invalid capability pattern '{}': {}", pattern, e))
    })
}
