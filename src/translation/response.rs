// Response translation (OpenAI → Anthropic)
// Author: kelexine (https://github.com/kelexine)

use super::TranslationContext;
use crate::error::{ProxyError, Result};
use crate::models::anthropic::{ContentBlock, MessagesResponse, Usage};
use crate::models::openai::{ChatCompletionResponse, ChatUsage};
use crate::tools::{tool_calls_to_blocks, ToolMode};
use tracing::debug;

/// Translate a complete chat-completions response into an Anthropic message.
pub fn translate_response(response: ChatCompletionResponse, ctx: &TranslationContext) -> Result<MessagesResponse> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProxyError::MalformedResponse("No choices in upstream response".to_string()))?;

    debug!("Response finish_reason: {:?}", choice.finish_reason);

    let message = ctx.pipeline.reverse(choice.message);
    let mut content = Vec::new();

    if let Some(thinking) = message.thinking.filter(|t| !t.trim().is_empty()) {
        content.push(ContentBlock::thinking(thinking));
    }

    let text = message.content.unwrap_or_default();
    match ctx.tool_mode {
        ToolMode::Xml => content.extend(ctx.xml_parser.parse(&text)),
        ToolMode::Native | ToolMode::None => {
            if !text.trim().is_empty() {
                content.push(ContentBlock::text(text));
            }
        }
    }

    if let Some(calls) = message.tool_calls.as_deref() {
        content.extend(tool_calls_to_blocks(calls));
    }

    let had_tool_use = content.iter().any(|b| matches!(b, ContentBlock::ToolUse { .. }));
    let usage = response.usage.as_ref().map(usage_from).unwrap_or_default();

    debug!(
        "Translated response: {} content blocks, usage: {:?}",
        content.len(),
        usage
    );

    let mut translated = MessagesResponse::new(ctx.model.clone(), content, usage);
    translated.stop_reason = Some(map_finish_reason(choice.finish_reason.as_deref(), had_tool_use));
    Ok(translated)
}

pub(crate) fn usage_from(usage: &ChatUsage) -> Usage {
    Usage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        cache_creation_input_tokens: 0,
        cache_read_input_tokens: usage
            .prompt_tokens_details
            .as_ref()
            .map_or(0, |d| d.cached_tokens),
    }
}

/// Map an OpenAI `finish_reason` to an Anthropic `stop_reason`.
pub fn map_finish_reason(reason: Option<&str>, had_tool_use: bool) -> String {
    match reason {
        Some("length") => "max_tokens",
        // `tool_calls` without an emitted tool_use block is a plain turn end
        _ if had_tool_use => "tool_use",
        _ => "end_turn",
    }
    .to_string()
}
