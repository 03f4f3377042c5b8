// Native tool calls → tool_use blocks
// Author: kelexine (https://github.com/kelexine)

use crate::models::anthropic::{new_tool_use_id, ContentBlock};
use crate::models::openai::ToolCall;
use serde_json::{json, Map, Value};
use tracing::warn;

/// Decode a tool-call argument string into a JSON object.
///
/// Blank input is an empty object. Anything that is not a JSON object comes
/// back as `{"raw": "<string>"}` so the call is never lost.
pub fn decode_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Map::new());
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) | Err(_) => {
            warn!("Tool arguments are not a JSON object, passing raw string");
            crate::metrics::record_tool_parse_degradation("native");
            json!({ "raw": raw })
        }
    }
}

/// Map complete upstream tool calls to `tool_use` blocks in emitted order.
pub fn tool_calls_to_blocks(calls: &[ToolCall]) -> Vec<ContentBlock> {
    calls
        .iter()
        .map(|call| {
            let id = call
                .id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(new_tool_use_id);
            let name = call.function.name.clone().unwrap_or_default();
            let input = decode_arguments(call.function.arguments.as_deref().unwrap_or(""));
            ContentBlock::tool_use(id, name, input)
        })
        .collect()
}
