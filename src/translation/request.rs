// Request translation (Anthropic → OpenAI chat completions)
// Author: kelexine (https://github.com/kelexine)

use crate::error::{ProxyError, Result};
use crate::models::anthropic::{ContentBlock, Message, MessageContent, MessagesRequest, ToolChoice};
use crate::models::openai::{
    ChatCompletionRequest, ChatContent, ChatMessage, ChatTool, ContentPart, FunctionCall,
    FunctionDefinition, ImageUrl, ToolCall,
};
use serde_json::{json, Value};
use tracing::debug;

/// Translate an Anthropic `MessagesRequest` into an OpenAI chat-completions
/// request for `model`. Tools are always rendered natively here; XML mode
/// rewrites the result afterwards.
pub fn translate_request(request: &MessagesRequest, model: &str) -> Result<ChatCompletionRequest> {
    debug!("Translating request for model: {} -> {}", request.model, model);

    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if let Some(system) = &request.system {
        let text = system.to_text();
        if !text.trim().is_empty() {
            messages.push(ChatMessage::text("system", text));
        }
    }

    for message in &request.messages {
        messages.extend(translate_message(message)?);
    }

    let tools = request
        .tools
        .as_ref()
        .filter(|tools| !tools.is_empty())
        .map(|tools| {
            tools
                .iter()
                .map(|tool| ChatTool {
                    tool_type: "function".to_string(),
                    function: FunctionDefinition {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.input_schema.clone(),
                    },
                })
                .collect::<Vec<_>>()
        });

    let tool_choice = match (&tools, &request.tool_choice) {
        (Some(_), Some(choice)) => Some(translate_tool_choice(choice)),
        _ => None,
    };

    let stream = request.is_streaming();

    debug!(
        "Translated request: {} messages, tools: {}, stream: {}",
        messages.len(),
        tools.as_ref().map_or(0, Vec::len),
        stream
    );

    Ok(ChatCompletionRequest {
        model: model.to_string(),
        messages,
        max_tokens: Some(request.max_tokens),
        temperature: request.temperature,
        top_p: request.top_p,
        stop: request.stop_sequences.clone().filter(|s| !s.is_empty()),
        stream,
        stream_options: stream.then(|| json!({"include_usage": true})),
        tools,
        tool_choice,
        reasoning: None,
    })
}

fn translate_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::Any => json!("required"),
        ToolChoice::None => json!("none"),
        ToolChoice::Tool { name } => json!({"type": "function", "function": {"name": name}}),
    }
}

/// One Anthropic turn can expand into several OpenAI messages: tool results
/// become `tool` messages that must directly follow the assistant call.
fn translate_message(message: &Message) -> Result<Vec<ChatMessage>> {
    match message.role.as_str() {
        "user" => Ok(translate_user(&message.content)),
        "assistant" => Ok(vec![translate_assistant(&message.content)]),
        other => Err(ProxyError::InvalidRequest(format!(
            "Invalid role: {}. Must be 'user' or 'assistant'.",
            other
        ))),
    }
}

fn translate_user(content: &MessageContent) -> Vec<ChatMessage> {
    let blocks = match content {
        MessageContent::Text(text) => return vec![ChatMessage::text("user", text.clone())],
        MessageContent::Blocks(blocks) => blocks,
    };

    let mut out = Vec::new();
    let mut parts = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text, .. } => parts.push(ContentPart::Text { text: text.clone() }),
            ContentBlock::Image { source, .. } => parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl { url: source.to_url() },
            }),
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                let mut text = content.to_string();
                if *is_error == Some(true) {
                    text = format!("Error: {}", text);
                }
                out.push(ChatMessage {
                    role: "tool".to_string(),
                    content: Some(ChatContent::Text(text)),
                    tool_calls: None,
                    tool_call_id: Some(tool_use_id.clone()),
                });
            }
            // Thinking and tool_use never appear in user turns
            _ => {}
        }
    }

    if !parts.is_empty() {
        out.push(ChatMessage {
            role: "user".to_string(),
            content: Some(collapse_parts(parts)),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    out
}

/// Text-only content goes out as a plain string; backends without vision
/// support often reject the parts form.
fn collapse_parts(parts: Vec<ContentPart>) -> ChatContent {
    if parts.iter().all(|p| matches!(p, ContentPart::Text { .. })) {
        let text = parts
            .into_iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        ChatContent::Text(text)
    } else {
        ChatContent::Parts(parts)
    }
}

fn translate_assistant(content: &MessageContent) -> ChatMessage {
    let blocks = match content {
        MessageContent::Text(text) => return ChatMessage::text("assistant", text.clone()),
        MessageContent::Blocks(blocks) => blocks,
    };

    let mut text = Vec::new();
    let mut tool_calls = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text: t, .. } => text.push(t.as_str()),
            ContentBlock::ToolUse { id, name, input, .. } => tool_calls.push(ToolCall {
                index: None,
                id: Some(id.clone()),
                call_type: Some("function".to_string()),
                function: FunctionCall {
                    name: Some(name.clone()),
                    arguments: Some(input.to_string()),
                },
            }),
            // Prior reasoning is not replayed to OpenAI-compatible backends
            _ => {}
        }
    }

    let text = text.join("\n");
    ChatMessage {
        role: "assistant".to_string(),
        content: (!text.is_empty() || tool_calls.is_empty()).then(|| ChatContent::Text(text)),
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        tool_call_id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: Value) -> MessagesRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_simple_message_translation() {
        let req = request(json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 512,
            "system": "Be brief.",
            "stop_sequences": ["END"],
            "temperature": 0.3,
            "messages": [{"role": "user", "content": "Hello, world!"}]
        }));

        let out = translate_request(&req, "openai/gpt-4o").unwrap();
        assert_eq!(out.model, "openai/gpt-4o");
        assert_eq!(out.max_tokens, Some(512));
        assert_eq!(out.stop, Some(vec!["END".to_string()]));
        assert_eq!(out.messages.len(), 2);
        assert_eq!(out.messages[0].role, "system");
        assert_eq!(out.messages[1].text_content(), "Hello, world!");
        assert!(!out.stream);
        assert!(out.stream_options.is_none());
    }

    #[test]
    fn test_streaming_requests_usage() {
        let req = request(json!({
            "model": "m", "max_tokens": 1, "stream": true,
            "messages": [{"role": "user", "content": "hi"}]
        }));
        let out = translate_request(&req, "m").unwrap();
        assert!(out.stream);
        assert_eq!(out.stream_options, Some(json!({"include_usage": true})));
    }

    #[test]
    fn test_invalid_role() {
        let req = request(json!({
            "model": "m", "max_tokens": 1,
            "messages": [{"role": "system", "content": "nope"}]
        }));
        assert!(matches!(
            translate_request(&req, "m"),
            Err(ProxyError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_tool_round_trip_history() {
        let req = request(json!({
            "model": "m",
            "max_tokens": 100,
            "tools": [{"name": "Read", "description": "Read a file", "input_schema": {"type": "object"}}],
            "tool_choice": {"type": "any"},
            "messages": [
                {"role": "user", "content": "read /a"},
                {"role": "assistant", "content": [
                    {"type": "thinking", "thinking": "need the file", "signature": "s"},
                    {"type": "text", "text": "Reading."},
                    {"type": "tool_use", "id": "toolu_1", "name": "Read", "input": {"path": "/a"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": "contents"},
                    {"type": "text", "text": "now summarize"}
                ]}
            ]
        }));

        let out = translate_request(&req, "m").unwrap();
        assert_eq!(out.tool_choice, Some(json!("required")));
        assert_eq!(out.tools.as_ref().unwrap()[0].function.name, "Read");

        let roles: Vec<&str> = out.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "tool", "user"]);

        let assistant = &out.messages[1];
        assert_eq!(assistant.text_content(), "Reading.");
        let call = &assistant.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.id.as_deref(), Some("toolu_1"));
        assert_eq!(call.function.arguments.as_deref(), Some(r#"{"path":"/a"}"#));

        assert_eq!(out.messages[2].tool_call_id.as_deref(), Some("toolu_1"));
        assert_eq!(out.messages[2].text_content(), "contents");
        assert_eq!(out.messages[3].text_content(), "now summarize");
    }

    #[test]
    fn test_tool_only_assistant_has_no_content() {
        let req = request(json!({
            "model": "m", "max_tokens": 1,
            "messages": [{"role": "assistant", "content": [
                {"type": "tool_use", "id": "toolu_1", "name": "LS", "input": {}}
            ]}]
        }));
        let out = translate_request(&req, "m").unwrap();
        assert!(out.messages[0].content.is_none());
        assert!(out.messages[0].tool_calls.is_some());
    }

    #[test]
    fn test_image_becomes_part() {
        let req = request(json!({
            "model": "m", "max_tokens": 1,
            "messages": [{"role": "user", "content": [
                {"type": "text", "text": "what is this"},
                {"type": "image", "source": {"type": "base64", "media_type": "image/jpeg", "data": "QUJD"}}
            ]}]
        }));
        let out = translate_request(&req, "m").unwrap();
        match out.messages[0].content.as_ref().unwrap() {
            ChatContent::Parts(parts) => {
                assert_eq!(parts.len(), 2);
                assert_eq!(
                    parts[1],
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: "data:image/jpeg;base64,QUJD".to_string() }
                    }
                );
            }
            other => panic!("expected parts, got {:?}", other),
        }
    }

    #[test]
    fn test_tool_choice_without_tools_is_dropped() {
        let req = request(json!({
            "model": "m", "max_tokens": 1,
            "tool_choice": {"type": "auto"},
            "messages": [{"role": "user", "content": "hi"}]
        }));
        let out = translate_request(&req, "m").unwrap();
        assert!(out.tools.is_none());
        assert!(out.tool_choice.is_none());
    }
}
