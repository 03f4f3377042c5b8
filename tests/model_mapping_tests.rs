// Model mapping and capability matching tests
// Author: kelexine (https://github.com/kelexine)

use throne_proxy::capability::CapabilityMatcher;
use throne_proxy::config::{CapabilitiesConfig, ModelMappingConfig, ProfileConfig};
use throne_proxy::models::mapping::map_model;
use throne_proxy::transform::TransformerKind;

fn mapping() -> ModelMappingConfig {
    ModelMappingConfig {
        reasoning_model: Some("deepseek/deepseek-r1".to_string()),
        completion_model: Some("qwen/qwen3-coder".to_string()),
    }
}

#[test]
fn test_claude_families() {
    let m = mapping();
    assert_eq!(map_model("claude-opus-4-5", false, &m), "deepseek/deepseek-r1");
    assert_eq!(map_model("claude-sonnet-4-5-20250929", false, &m), "deepseek/deepseek-r1");
    assert_eq!(map_model("claude-haiku-4-5-20251001", false, &m), "qwen/qwen3-coder");
    assert_eq!(map_model("claude-3.7-sonnet", false, &m), "deepseek/deepseek-r1");
}

#[test]
fn test_case_insensitive_family() {
    assert_eq!(map_model("Claude-Haiku-4-5", false, &mapping()), "qwen/qwen3-coder");
}

#[test]
fn test_empty_mapping_passes_through() {
    let empty = ModelMappingConfig::default();
    assert_eq!(map_model("claude-sonnet-4-5", false, &empty), "claude-sonnet-4-5");
    assert_eq!(map_model("claude-haiku-4-5", true, &empty), "claude-haiku-4-5");
}

#[test]
fn test_unknown_ids_pass_through() {
    assert_eq!(map_model("meta-llama/llama-3.3-70b", false, &mapping()), "meta-llama/llama-3.3-70b");
    assert_eq!(map_model("", false, &mapping()), "");
}

#[test]
fn test_mapped_model_selects_profile() {
    let matcher = CapabilityMatcher::from_config(&CapabilitiesConfig::default()).unwrap();

    let r1 = matcher.match_model(&map_model("claude-opus-4-5", false, &mapping()));
    assert!(r1.needs_xml_tools);
    assert_eq!(r1.transformers, vec![TransformerKind::Reasoning, TransformerKind::ThinkTags]);

    let coder = matcher.match_model(&map_model("claude-haiku-4-5", false, &mapping()));
    assert!(!coder.needs_xml_tools);
    assert_eq!(coder.transformers, vec![TransformerKind::EnhanceTool]);
}

#[test]
fn test_operator_profiles_precede_builtins() {
    let config = CapabilitiesConfig {
        profiles: vec![ProfileConfig {
            pattern: "DeepSeek/*".to_string(),
            xml_tools: false,
            transformers: vec!["maxtoken".to_string()],
            max_tokens: Some(1024),
        }],
        use_builtin: true,
    };
    let matcher = CapabilityMatcher::from_config(&config).unwrap();

    let profile = matcher.match_model("deepseek/deepseek-r1");
    assert_eq!(profile.model_pattern, "DeepSeek/*");
    assert_eq!(profile.max_tokens_override, Some(1024));
}

#[test]
fn test_unknown_transformer_is_configuration_error() {
    let config = CapabilitiesConfig {
        profiles: vec![ProfileConfig {
            pattern: "*".to_string(),
            xml_tools: false,
            transformers: vec!["telepathy".to_string()],
            max_tokens: None,
        }],
        use_builtin: false,
    };
    assert!(CapabilityMatcher::from_config(&config).is_err());
}
