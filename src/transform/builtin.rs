// Built-in transformers
// Author: kelexine (https://github.com/kelexine)

use super::think_tags::split_think_tags;
use super::{TransformOptions, Transformer};
use crate::models::openai::{AssistantMessage, ChatCompletionRequest};
use serde_json::{json, Value};
use tracing::debug;

const REQUIRED_HINT_PREFIX: &str = "Required parameters:";

/// Clamps `max_tokens` to the profile override.
#[derive(Debug, Default)]
pub struct MaxTokens;

impl Transformer for MaxTokens {
    fn name(&self) -> &'static str {
        "maxtoken"
    }

    fn forward(&self, mut request: ChatCompletionRequest, opts: &TransformOptions) -> ChatCompletionRequest {
        if let Some(cap) = opts.max_tokens_override {
            let clamped = request.max_tokens.map_or(cap, |requested| requested.min(cap));
            if request.max_tokens != Some(clamped) {
                debug!("Clamping max_tokens {:?} -> {}", request.max_tokens, clamped);
            }
            request.max_tokens = Some(clamped);
        }
        request
    }
}

/// Appends the required-parameter list to each tool description.
#[derive(Debug, Default)]
pub struct EnhanceTool;

impl Transformer for EnhanceTool {
    fn name(&self) -> &'static str {
        "enhancetool"
    }

    fn forward(&self, mut request: ChatCompletionRequest, _opts: &TransformOptions) -> ChatCompletionRequest {
        for tool in request.tools.iter_mut().flatten() {
            let required = required_params(&tool.function.parameters);
            if required.is_empty() {
                continue;
            }

            let description = tool.function.description.get_or_insert_with(String::new);
            if description.contains(REQUIRED_HINT_PREFIX) {
                continue;
            }
            if !description.is_empty() {
                description.push_str("\n\n");
            }
            description.push_str(&format!("{} {}.", REQUIRED_HINT_PREFIX, required.join(", ")));
        }
        request
    }
}

fn required_params(schema: &Value) -> Vec<&str> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// Thinking budget → `reasoning` request object; provider reasoning fields →
/// canonical `thinking`.
#[derive(Debug, Default)]
pub struct Reasoning;

impl Transformer for Reasoning {
    fn name(&self) -> &'static str {
        "reasoning"
    }

    fn forward(&self, mut request: ChatCompletionRequest, opts: &TransformOptions) -> ChatCompletionRequest {
        if request.reasoning.is_some() {
            return request;
        }
        request.reasoning = match opts.thinking_budget {
            Some(0) => Some(json!({"enabled": true})),
            Some(budget) => Some(json!({"max_tokens": budget})),
            None => None,
        };
        request
    }

    fn reverse(&self, mut message: AssistantMessage, _opts: &TransformOptions) -> AssistantMessage {
        let lifted: String = [message.reasoning_content.take(), message.reasoning.take()]
            .into_iter()
            .flatten()
            .collect();

        if !lifted.is_empty() {
            message.thinking.get_or_insert_with(String::new).push_str(&lifted);
        }
        message
    }
}

/// Lifts `<think>` spans out of complete assistant text.
///
/// Stream deltas pass through untouched; the stream translator runs a
/// stateful splitter instead.
#[derive(Debug, Default)]
pub struct ThinkTags;

impl Transformer for ThinkTags {
    fn name(&self) -> &'static str {
        "thinktags"
    }

    fn reverse(&self, mut message: AssistantMessage, _opts: &TransformOptions) -> AssistantMessage {
        let Some((thinking, answer)) = message.content.as_deref().and_then(split_think_tags) else {
            return message;
        };

        if !thinking.is_empty() {
            let existing = message.thinking.get_or_insert_with(String::new);
            if !existing.is_empty() {
                existing.push('\n');
            }
            existing.push_str(&thinking);
        }
        message.content = Some(answer);
        message
    }

    fn reverse_delta(&self, delta: AssistantMessage, _opts: &TransformOptions) -> AssistantMessage {
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::openai::{ChatMessage, ChatTool, FunctionDefinition};

    fn request() -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "m".to_string(),
            messages: vec![ChatMessage::text("user", "hi")],
            max_tokens: Some(32000),
            temperature: Some(0.5),
            top_p: None,
            stop: None,
            stream: true,
            stream_options: None,
            tools: Some(vec![ChatTool {
                tool_type: "function".to_string(),
                function: FunctionDefinition {
                    name: "Read".to_string(),
                    description: Some("Read a file".to_string()),
                    parameters: json!({
                        "type": "object",
                        "properties": {"path": {"type": "string"}},
                        "required": ["path"]
                    }),
                },
            }]),
            tool_choice: None,
            reasoning: None,
        }
    }

    #[test]
    fn test_max_tokens_clamps_down_only() {
        let opts = TransformOptions {
            max_tokens_override: Some(8192),
            ..Default::default()
        };
        assert_eq!(MaxTokens.forward(request(), &opts).max_tokens, Some(8192));

        let mut small = request();
        small.max_tokens = Some(100);
        assert_eq!(MaxTokens.forward(small, &opts).max_tokens, Some(100));

        let untouched = MaxTokens.forward(request(), &TransformOptions::default());
        assert_eq!(untouched.max_tokens, Some(32000));
    }

    #[test]
    fn test_enhance_tool_is_idempotent() {
        let opts = TransformOptions::default();
        let once = EnhanceTool.forward(request(), &opts);
        let twice = EnhanceTool.forward(once.clone(), &opts);

        let description = once.tools.as_ref().unwrap()[0].function.description.clone().unwrap();
        assert_eq!(description, "Read a file\n\nRequired parameters: path.");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_reasoning_forward() {
        let opts = TransformOptions {
            thinking_budget: Some(4096),
            ..Default::default()
        };
        let out = Reasoning.forward(request(), &opts);
        assert_eq!(out.reasoning, Some(json!({"max_tokens": 4096})));

        let none = Reasoning.forward(request(), &TransformOptions::default());
        assert!(none.reasoning.is_none());
    }

    #[test]
    fn test_reasoning_reverse_moves_fields() {
        let message = AssistantMessage {
            content: Some("answer".to_string()),
            reasoning_content: Some("step 1".to_string()),
            ..Default::default()
        };
        let out = Reasoning.reverse(message, &TransformOptions::default());
        assert_eq!(out.thinking.as_deref(), Some("step 1"));
        assert!(out.reasoning_content.is_none());
        assert_eq!(out.content.as_deref(), Some("answer"));
    }

    #[test]
    fn test_think_tags_reverse() {
        let message = AssistantMessage {
            content: Some("<think>hmm</think>\n\nDone.".to_string()),
            ..Default::default()
        };
        let out = ThinkTags.reverse(message, &TransformOptions::default());
        assert_eq!(out.thinking.as_deref(), Some("hmm"));
        assert_eq!(out.content.as_deref(), Some("Done."));
    }

    #[test]
    fn test_think_tags_delta_passthrough() {
        let delta = AssistantMessage {
            content: Some("<think>partial".to_string()),
            ..Default::default()
        };
        let out = ThinkTags.reverse_delta(delta.clone(), &TransformOptions::default());
        assert_eq!(out, delta);
    }
}
