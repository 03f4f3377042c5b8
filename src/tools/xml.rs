// XML tool-calling mode: prompt synthesis and response scanning
// Author: kelexine (https://github.com/kelexine)

use super::BUILTIN_TOOL_NAMES;
use crate::models::anthropic::{new_tool_use_id, ContentBlock};
use crate::models::openai::{ChatContent, ChatCompletionRequest, ChatMessage, ChatTool};
use serde_json::{Map, Number, Value};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use tracing::{debug, warn};

const XML_TOOLS_PREAMBLE: &str = "\
# Tool use

You can call the tools listed below. To call a tool, write an XML block whose \
outer tag is the tool name and whose child tags are its parameters:

<ToolName>
<parameter_name>value</parameter_name>
</ToolName>

Rules:
- Only use the tools listed here, spelled exactly as shown.
- Put every parameter in its own tag. Write array and object values as JSON.
- You may call several tools in one reply. After your calls, stop and wait for the results.
- Results are returned to you inside <tool_result> blocks.";

/// System prompt fragment describing `tools` in the call grammar.
pub fn render_tool_prompt(tools: &[ChatTool]) -> String {
    let mut prompt = String::from(XML_TOOLS_PREAMBLE);
    prompt.push_str("\n\n## Available tools\n");

    for tool in tools {
        let function = &tool.function;
        let _ = write!(prompt, "\n### {}\n", function.name);
        if let Some(description) = function.description.as_deref().filter(|d| !d.trim().is_empty()) {
            let _ = writeln!(prompt, "{}", description.trim());
        }

        let required: HashSet<&str> = function
            .parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        match function.parameters.get("properties").and_then(Value::as_object) {
            Some(properties) if !properties.is_empty() => {
                prompt.push_str("Parameters:\n");
                for (name, schema) in properties {
                    let kind = schema_type(Some(schema)).unwrap_or("string");
                    let flag = if required.contains(name.as_str()) { "required" } else { "optional" };
                    let _ = write!(prompt, "- {} ({}, {})", name, kind, flag);
                    if let Some(description) = schema.get("description").and_then(Value::as_str) {
                        let _ = write!(prompt, ": {}", description.trim());
                    }
                    prompt.push('\n');
                }
            }
            _ => prompt.push_str("Parameters: none\n"),
        }
    }

    prompt
}

/// Render one call in the grammar the prompt teaches.
pub fn render_call(name: &str, input: &Value) -> String {
    let mut out = format!("<{}>\n", name);
    if let Some(params) = input.as_object() {
        for (key, value) in params {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let _ = writeln!(out, "<{}>{}</{}>", key, rendered, key);
        }
    }
    let _ = write!(out, "</{}>", name);
    out
}

/// Rewrite an outbound request for a backend without function calling.
///
/// Tool definitions move into the system prompt, `tools`/`tool_choice` are
/// removed, prior `tool_calls` become XML text and `tool` messages become
/// `<tool_result>` user turns. Returns the removed definitions so the
/// response side can recognize and coerce them.
pub fn rewrite_request_for_xml(request: &mut ChatCompletionRequest) -> Vec<ChatTool> {
    let tools = request.tools.take().unwrap_or_default();
    request.tool_choice = None;

    for message in request.messages.iter_mut() {
        if let Some(calls) = message.tool_calls.take() {
            let mut text = message.text_content();
            for call in &calls {
                let name = call.function.name.as_deref().unwrap_or_default();
                let raw = call.function.arguments.as_deref().unwrap_or("{}");
                let input = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
                if !text.is_empty() {
                    text.push_str("\n\n");
                }
                text.push_str(&render_call(name, &input));
            }
            message.content = Some(ChatContent::Text(text));
        }

        if message.role == "tool" {
            let id = message.tool_call_id.take().unwrap_or_default();
            let body = message.text_content();
            message.role = "user".to_string();
            message.content = Some(ChatContent::Text(format!(
                "<tool_result tool_use_id=\"{}\">\n{}\n</tool_result>",
                id, body
            )));
        }
    }

    if !tools.is_empty() {
        let prompt = render_tool_prompt(&tools);
        match request.messages.first_mut() {
            Some(first) if first.role == "system" => {
                let mut text = first.text_content();
                if !text.is_empty() {
                    text.push_str("\n\n");
                }
                text.push_str(&prompt);
                first.content = Some(ChatContent::Text(text));
            }
            _ => request.messages.insert(0, ChatMessage::text("system", prompt)),
        }
        debug!("Injected XML tool prompt for {} tools", tools.len());
    }

    tools
}

/// Single-pass scanner turning assistant prose into text and `tool_use`
/// blocks.
#[derive(Debug, Clone)]
pub struct XmlToolParser {
    /// Recognized tool names with their parameter schema, when declared.
    tools: HashMap<String, Option<Value>>,
}

impl Default for XmlToolParser {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl XmlToolParser {
    /// Recognizes the built-in tool names plus every declared tool.
    pub fn new(declared: &[ChatTool]) -> Self {
        let mut tools: HashMap<String, Option<Value>> = BUILTIN_TOOL_NAMES
            .iter()
            .map(|name| (name.to_string(), None))
            .collect();
        for tool in declared {
            tools.insert(tool.function.name.clone(), Some(tool.function.parameters.clone()));
        }
        Self { tools }
    }

    pub fn is_recognized(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Scan `text` left to right. Unrecognized and unterminated tags stay
    /// literal text.
    pub fn parse(&self, text: &str) -> Vec<ContentBlock> {
        let mut blocks = Vec::new();
        let mut span_start = 0;
        let mut cursor = 0;
        // Names whose closing tag is known to be absent from the rest of the text
        let mut unclosed: HashSet<&str> = HashSet::new();

        while let Some(offset) = text[cursor..].find('<') {
            let open = cursor + offset;
            cursor = open + 1;

            let Some((name, body_start)) = opening_tag(text, open) else {
                continue;
            };
            if !self.is_recognized(name) || unclosed.contains(name) {
                continue;
            }

            let closing = format!("</{}>", name);
            let Some(body_len) = text[body_start..].find(&closing) else {
                debug!("Unterminated <{}> tag left as text", name);
                unclosed.insert(name);
                continue;
            };
            let body = &text[body_start..body_start + body_len];
            let end = body_start + body_len + closing.len();
            cursor = end;

            match self.parse_call(name, body) {
                Some(block) => {
                    push_text(&mut blocks, &text[span_start..open]);
                    blocks.push(block);
                    span_start = end;
                }
                None => {
                    warn!("Could not read parameters of <{}> call, keeping it as text", name);
                    crate::metrics::record_tool_parse_degradation("xml");
                }
            }
        }

        push_text(&mut blocks, &text[span_start..]);
        blocks
    }

    fn parse_call(&self, name: &str, body: &str) -> Option<ContentBlock> {
        let schema = self.tools.get(name).and_then(Option::as_ref);
        let mut input = Map::new();

        for (key, raw) in leaf_tags(body) {
            let value = coerce(raw, property_schema(schema, key));
            input.insert(key.to_string(), value);
        }

        if input.is_empty() {
            let bare = body.trim();
            if !bare.is_empty() {
                // Bare body: only usable when the tool has exactly one parameter
                let (key, prop) = sole_parameter(schema)?;
                input.insert(key, coerce(bare, prop));
            }
        }

        Some(ContentBlock::tool_use(new_tool_use_id(), name, Value::Object(input)))
    }
}

fn push_text(blocks: &mut Vec<ContentBlock>, span: &str) {
    let trimmed = span.trim();
    if !trimmed.is_empty() {
        blocks.push(ContentBlock::text(trimmed));
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Parse `<name>` starting at `open`. Returns the name and the index just
/// past `>`.
fn opening_tag(text: &str, open: usize) -> Option<(&str, usize)> {
    let rest = &text[open + 1..];
    let name_len = rest.find(|c: char| !is_name_char(c)).unwrap_or(rest.len());
    if name_len == 0 || !rest[name_len..].starts_with('>') {
        return None;
    }
    Some((&rest[..name_len], open + 1 + name_len + 1))
}

/// Direct child elements of `body` as (tag, inner text). Text between
/// children and tags that never close are ignored.
fn leaf_tags(body: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = body[cursor..].find('<') {
        let open = cursor + offset;
        cursor = open + 1;

        let Some((name, inner_start)) = opening_tag(body, open) else {
            continue;
        };
        let closing = format!("</{}>", name);
        if let Some(inner_len) = body[inner_start..].find(&closing) {
            pairs.push((name, &body[inner_start..inner_start + inner_len]));
            cursor = inner_start + inner_len + closing.len();
        }
    }

    pairs
}

fn schema_type(schema: Option<&Value>) -> Option<&str> {
    match schema?.get("type")? {
        Value::String(kind) => Some(kind.as_str()),
        Value::Array(kinds) => kinds
            .iter()
            .filter_map(Value::as_str)
            .find(|kind| *kind != "null"),
        _ => None,
    }
}

fn property_schema<'a>(schema: Option<&'a Value>, key: &str) -> Option<&'a Value> {
    schema?.get("properties")?.get(key)
}

fn sole_parameter(schema: Option<&Value>) -> Option<(String, Option<&Value>)> {
    let properties = schema?.get("properties")?.as_object()?;
    if properties.len() != 1 {
        return None;
    }
    properties
        .iter()
        .next()
        .map(|(key, prop)| (key.clone(), Some(prop)))
}

fn string_value(raw: &str) -> Value {
    Value::String(raw.trim_matches(|c| c == '\n' || c == '\r').to_string())
}

/// Coerce a raw tag value to the declared JSON-schema type. Values that do
/// not fit the type stay strings.
fn coerce(raw: &str, schema: Option<&Value>) -> Value {
    let trimmed = raw.trim();
    match schema_type(schema) {
        Some("integer") => trimmed
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| string_value(raw)),
        Some("number") => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| string_value(raw)),
        Some("boolean") => match trimmed.to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => string_value(raw),
        },
        Some("array") => {
            if let Ok(array @ Value::Array(_)) = serde_json::from_str::<Value>(trimmed) {
                return array;
            }
            let items = schema.and_then(|s| s.get("items"));
            let children = leaf_tags(raw);
            if children.is_empty() {
                string_value(raw)
            } else {
                Value::Array(children.into_iter().map(|(_, v)| coerce(v, items)).collect())
            }
        }
        Some("object") => {
            if let Ok(object @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
                return object;
            }
            let children = leaf_tags(raw);
            if children.is_empty() {
                string_value(raw)
            } else {
                let map = children
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), coerce(v, property_schema(schema, k))))
                    .collect();
                Value::Object(map)
            }
        }
        _ => string_value(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::openai::{FunctionCall, FunctionDefinition, ToolCall};
    use proptest::prelude::*;
    use serde_json::json;

    fn tool(name: &str, parameters: Value) -> ChatTool {
        ChatTool {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.to_string(),
                description: Some(format!("{} tool", name)),
                parameters,
            },
        }
    }

    fn expect_text(block: &ContentBlock) -> &str {
        match block {
            ContentBlock::Text { text, .. } => text,
            other => panic!("expected text block, got {:?}", other),
        }
    }

    fn expect_tool(block: &ContentBlock) -> (&str, &str, &Value) {
        match block {
            ContentBlock::ToolUse { id, name, input, .. } => (id, name, input),
            other => panic!("expected tool_use block, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_and_plain_text() {
        let parser = XmlToolParser::default();
        assert!(parser.parse("").is_empty());
        assert!(parser.parse("  \n\t ").is_empty());

        let blocks = parser.parse("  just an answer \n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(expect_text(&blocks[0]), "just an answer");
    }

    #[test]
    fn test_single_read_call() {
        let blocks = XmlToolParser::default().parse("<Read><path>/a</path></Read>");
        assert_eq!(blocks.len(), 1);
        let (id, name, input) = expect_tool(&blocks[0]);
        assert!(id.starts_with("toolu_"));
        assert_eq!(name, "Read");
        assert_eq!(input, &json!({"path": "/a"}));
    }

    #[test]
    fn test_text_tool_text_order() {
        let blocks = XmlToolParser::default().parse("Hello\n<Read><path>/a</path></Read>\nDone");
        assert_eq!(blocks.len(), 3);
        assert_eq!(expect_text(&blocks[0]), "Hello");
        assert_eq!(expect_tool(&blocks[1]).1, "Read");
        assert_eq!(expect_text(&blocks[2]), "Done");
    }

    #[test]
    fn test_unregistered_tag_stays_verbatim() {
        let text = "Start a <Task>x</Task> in the background";
        let blocks = XmlToolParser::default().parse(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(expect_text(&blocks[0]), text);
    }

    #[test]
    fn test_unterminated_tag_is_literal() {
        let text = "Reading now <Read><path>/a</path>";
        let blocks = XmlToolParser::default().parse(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(expect_text(&blocks[0]), text);
    }

    #[test]
    fn test_multiple_calls_get_unique_ids() {
        let blocks = XmlToolParser::default()
            .parse("<Read><path>/a</path></Read><Read><path>/b</path></Read>");
        assert_eq!(blocks.len(), 2);
        let (first, _, a) = expect_tool(&blocks[0]);
        let (second, _, b) = expect_tool(&blocks[1]);
        assert_ne!(first, second);
        assert_eq!(a["path"], "/a");
        assert_eq!(b["path"], "/b");
    }

    #[test]
    fn test_values_coerced_by_schema() {
        let parser = XmlToolParser::new(&[tool(
            "Grep",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string"},
                    "head_limit": {"type": "integer"},
                    "multiline": {"type": "boolean"},
                    "globs": {"type": "array", "items": {"type": "string"}},
                    "ratio": {"type": ["number", "null"]}
                }
            }),
        )]);

        let blocks = parser.parse(
            "<Grep>\n<pattern>\nfn main\n</pattern>\n<head_limit>20</head_limit>\
             <multiline>TRUE</multiline><globs>[\"*.rs\"]</globs><ratio>0.5</ratio>\n</Grep>",
        );
        let (_, _, input) = expect_tool(&blocks[0]);
        assert_eq!(
            input,
            &json!({
                "pattern": "fn main",
                "head_limit": 20,
                "multiline": true,
                "globs": ["*.rs"],
                "ratio": 0.5
            })
        );
    }

    #[test]
    fn test_nested_children_build_arrays() {
        let parser = XmlToolParser::new(&[tool(
            "TodoWrite",
            json!({
                "type": "object",
                "properties": {
                    "todos": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {"content": {"type": "string"}, "done": {"type": "boolean"}}
                        }
                    }
                }
            }),
        )]);

        let blocks = parser.parse(
            "<TodoWrite><todos><todo><content>write tests</content><done>false</done></todo></todos></TodoWrite>",
        );
        let (_, _, input) = expect_tool(&blocks[0]);
        assert_eq!(input, &json!({"todos": [{"content": "write tests", "done": false}]}));
    }

    #[test]
    fn test_declared_tool_is_recognized() {
        let parser = XmlToolParser::new(&[tool("deploy", json!({"type": "object"}))]);
        assert!(parser.is_recognized("deploy"));
        assert!(!XmlToolParser::default().is_recognized("deploy"));

        let blocks = parser.parse("<deploy><env>prod</env></deploy>");
        assert_eq!(expect_tool(&blocks[0]).2, &json!({"env": "prod"}));
    }

    #[test]
    fn test_bare_body_uses_sole_parameter() {
        let parser = XmlToolParser::new(&[tool(
            "Bash",
            json!({"type": "object", "properties": {"command": {"type": "string"}}}),
        )]);
        let blocks = parser.parse("<Bash>ls -la</Bash>");
        assert_eq!(expect_tool(&blocks[0]).2, &json!({"command": "ls -la"}));
    }

    #[test]
    fn test_unreadable_body_degrades_to_text() {
        let text = "Try <Bash>ls -la</Bash> now";
        let blocks = XmlToolParser::default().parse(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(expect_text(&blocks[0]), text);
    }

    #[test]
    fn test_empty_call_has_empty_input() {
        let blocks = XmlToolParser::default().parse("<ExitPlanMode></ExitPlanMode>");
        assert_eq!(expect_tool(&blocks[0]).2, &json!({}));
    }

    #[test]
    fn test_prompt_lists_tools() {
        let prompt = render_tool_prompt(&[tool(
            "Read",
            json!({
                "type": "object",
                "properties": {"path": {"type": "string", "description": "File to read"}},
                "required": ["path"]
            }),
        )]);
        assert!(prompt.contains("### Read"));
        assert!(prompt.contains("- path (string, required): File to read"));
        assert!(prompt.contains("<ToolName>"));
    }

    #[test]
    fn test_rewrite_request() {
        let mut request = ChatCompletionRequest {
            model: "m".to_string(),
            messages: vec![
                ChatMessage::text("system", "Be brief."),
                ChatMessage::text("user", "read /a"),
                ChatMessage {
                    role: "assistant".to_string(),
                    content: Some(ChatContent::Text("Sure.".to_string())),
                    tool_calls: Some(vec![ToolCall {
                        index: None,
                        id: Some("toolu_1".to_string()),
                        call_type: Some("function".to_string()),
                        function: FunctionCall {
                            name: Some("Read".to_string()),
                            arguments: Some(r#"{"path":"/a"}"#.to_string()),
                        },
                    }]),
                    tool_call_id: None,
                },
                ChatMessage {
                    role: "tool".to_string(),
                    content: Some(ChatContent::Text("file body".to_string())),
                    tool_calls: None,
                    tool_call_id: Some("toolu_1".to_string()),
                },
            ],
            max_tokens: None,
            temperature: None,
            top_p: None,
            stop: None,
            stream: false,
            stream_options: None,
            tools: Some(vec![tool("Read", json!({"type": "object"}))]),
            tool_choice: Some(json!("auto")),
            reasoning: None,
        };

        let removed = rewrite_request_for_xml(&mut request);
        assert_eq!(removed.len(), 1);
        assert!(request.tools.is_none());
        assert!(request.tool_choice.is_none());

        let system = request.messages[0].text_content();
        assert!(system.starts_with("Be brief.\n\n# Tool use"));

        assert_eq!(
            request.messages[2].text_content(),
            "Sure.\n\n<Read>\n<path>/a</path>\n</Read>"
        );
        assert!(request.messages[2].tool_calls.is_none());

        assert_eq!(request.messages[3].role, "user");
        assert_eq!(
            request.messages[3].text_content(),
            "<tool_result tool_use_id=\"toolu_1\">\nfile body\n</tool_result>"
        );
    }

    #[test]
    fn test_rendered_call_parses_back() {
        let rendered = render_call("Read", &json!({"path": "/a"}));
        let blocks = XmlToolParser::default().parse(&rendered);
        assert_eq!(expect_tool(&blocks[0]).2, &json!({"path": "/a"}));
    }

    proptest! {
        #[test]
        fn prop_text_without_tool_tags_is_one_trimmed_block(text in "[a-z0-9 \n<>/]{0,80}") {
            let blocks = XmlToolParser::default().parse(&text);
            let trimmed = text.trim();
            if trimmed.is_empty() {
                prop_assert!(blocks.is_empty());
            } else {
                prop_assert_eq!(blocks.len(), 1);
                prop_assert_eq!(expect_text(&blocks[0]), trimmed);
            }
        }
    }
}
