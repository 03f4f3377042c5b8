// SSE event translation for streaming responses
// Author: kelexine (https://github.com/kelexine)

use super::response::{map_finish_reason, usage_from};
use super::TranslationContext;
use crate::models::anthropic::{new_message_id, new_tool_use_id, ContentBlock, Usage};
use crate::models::openai::{ChatCompletionChunk, ToolCall};
use crate::models::streaming::*;
use crate::tools::ToolMode;
use crate::transform::{ThinkSegment, ThinkTagSplitter};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Lifecycle of one translated stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// Nothing emitted yet.
    Idle,
    /// `message_start` sent, no content yet.
    Started,
    /// Relaying content.
    Streaming,
    /// Upstream sent its finish reason; waiting for trailing usage / end.
    Finalizing,
    /// `message_stop` sent. Nothing more is emitted.
    Closed,
}

#[derive(Debug, PartialEq, Clone, Copy)]
enum BlockType {
    Text,
    Thinking,
    ToolUse,
}

/// One upstream tool-call slot, keyed by its stream `index`.
#[derive(Debug)]
struct ToolSlot {
    block_index: Option<usize>,
    id: String,
    name: Option<String>,
    /// Arguments received before the name was known.
    pending_arguments: String,
    closed: bool,
}

/// Translates OpenAI chat-completion chunks into Anthropic SSE events.
///
/// Native tool mode relays text, thinking and tool arguments as they arrive.
/// XML tool mode streams thinking but holds answer text until the upstream
/// finishes, then replays the scanned blocks one start/delta/stop run each.
pub struct StreamTranslator {
    ctx: TranslationContext,
    message_id: String,
    phase: StreamPhase,

    // Block state tracking
    next_index: usize,
    open_block: Option<(usize, BlockType)>,
    answer_started: bool,
    /// Whitespace seen before any answer text.
    leading_whitespace: String,
    had_tool_use: bool,
    tool_slots: HashMap<usize, ToolSlot>,

    think_splitter: Option<ThinkTagSplitter>,
    text_buffer: String,
    finish_reason: Option<String>,
    usage: Usage,
}

impl StreamTranslator {
    pub fn new(ctx: TranslationContext) -> Self {
        let think_splitter = ctx.splits_think_tags().then(ThinkTagSplitter::new);
        Self {
            ctx,
            message_id: new_message_id(),
            phase: StreamPhase::Idle,

            next_index: 0,
            open_block: None,
            answer_started: false,
            leading_whitespace: String::new(),
            had_tool_use: false,
            tool_slots: HashMap::new(),

            think_splitter,
            text_buffer: String::new(),
            finish_reason: None,
            usage: Usage::default(),
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn model(&self) -> &str {
        &self.ctx.model
    }

    /// Emit `message_start` if it has not been sent yet.
    pub fn begin(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.ensure_started(&mut events);
        events
    }

    /// Translate every chunk then finish. Convenience for complete inputs.
    pub fn translate_all<I>(mut self, chunks: I) -> Vec<StreamEvent>
    where
        I: IntoIterator<Item = ChatCompletionChunk>,
    {
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(self.translate_chunk(chunk));
        }
        events.extend(self.finish());
        events
    }

    /// Translate one upstream chunk.
    pub fn translate_chunk(&mut self, chunk: ChatCompletionChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.phase == StreamPhase::Closed {
            return events;
        }
        self.ensure_started(&mut events);

        if let Some(usage) = &chunk.usage {
            self.usage = usage_from(usage);
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return events;
        };

        if self.phase == StreamPhase::Finalizing {
            debug!("Ignoring content after finish_reason");
            return events;
        }

        let delta = self.ctx.pipeline.reverse_delta(choice.delta);

        if let Some(thinking) = delta.thinking.filter(|t| !t.is_empty()) {
            self.push_thinking(&mut events, thinking);
        }

        if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
            match self.think_splitter.as_mut().map(|s| s.push(&content)) {
                Some(segments) => self.push_segments(&mut events, segments),
                None => self.push_text(&mut events, content),
            }
        }

        for call in delta.tool_calls.into_iter().flatten() {
            self.push_tool_fragment(&mut events, call);
        }

        if let Some(reason) = choice.finish_reason {
            debug!("Stream finished with reason: {}", reason);
            self.finish_reason = Some(reason);
            self.phase = StreamPhase::Finalizing;
        }

        events
    }

    /// Close the message. Safe to call more than once.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.phase == StreamPhase::Closed {
            return events;
        }
        self.ensure_started(&mut events);
        self.flush_content(&mut events);

        let stop_reason = map_finish_reason(self.finish_reason.as_deref(), self.had_tool_use);
        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaData {
                stop_reason: Some(stop_reason),
                stop_sequence: None,
            },
            usage: DeltaUsage {
                output_tokens: self.usage.output_tokens,
            },
        });
        events.push(StreamEvent::message_stop());
        self.phase = StreamPhase::Closed;
        events
    }

    /// Fold a mid-stream failure into the event sequence.
    pub fn fail(&mut self, error_type: &str, message: &str) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.phase == StreamPhase::Closed {
            return events;
        }
        self.ensure_started(&mut events);
        self.flush_content(&mut events);

        let error = ErrorData {
            error_type: error_type.to_string(),
            message: message.to_string(),
        };
        events.push(StreamEvent::Error { error: error.clone() });
        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaData {
                stop_reason: Some("error".to_string()),
                stop_sequence: None,
            },
            usage: DeltaUsage {
                output_tokens: self.usage.output_tokens,
            },
        });
        events.push(StreamEvent::MessageStop { error: Some(error) });
        self.phase = StreamPhase::Closed;
        events
    }

    /// Final usage as reported by the upstream.
    pub fn usage(&self) -> &Usage {
        &self.usage
    }

    fn ensure_started(&mut self, events: &mut Vec<StreamEvent>) {
        if self.phase != StreamPhase::Idle {
            return;
        }
        events.push(StreamEvent::MessageStart {
            message: MessageStart {
                id: self.message_id.clone(),
                message_type: "message".to_string(),
                role: "assistant".to_string(),
                content: vec![],
                model: self.ctx.model.clone(),
                stop_reason: None,
                stop_sequence: None,
                usage: self.usage.clone(),
            },
        });
        self.phase = StreamPhase::Started;
    }

    /// Flush held-back text and close whatever is open.
    fn flush_content(&mut self, events: &mut Vec<StreamEvent>) {
        if let Some(rest) = self.think_splitter.as_mut().and_then(ThinkTagSplitter::finish) {
            self.push_segments(events, vec![rest]);
        }

        if self.ctx.tool_mode == ToolMode::Xml {
            let text = std::mem::take(&mut self.text_buffer);
            let blocks = self.ctx.xml_parser.parse(&text);
            self.close_block(events);
            for block in blocks {
                self.replay_block(events, block);
            }
        }

        self.flush_unnamed_tool_slots(events);
        self.close_block(events);
    }

    /// Arguments for a slot whose tool name never arrived cannot form a
    /// tool_use block; they degrade to text.
    fn flush_unnamed_tool_slots(&mut self, events: &mut Vec<StreamEvent>) {
        let mut orphaned: Vec<(usize, String)> = self
            .tool_slots
            .iter_mut()
            .filter(|(_, slot)| slot.block_index.is_none() && slot.name.is_none())
            .map(|(key, slot)| {
                slot.closed = true;
                (*key, std::mem::take(&mut slot.pending_arguments))
            })
            .collect();
        orphaned.sort_by_key(|(key, _)| *key);

        for (key, arguments) in orphaned {
            warn!("Tool slot {} never received a name; relaying its arguments as text", key);
            crate::metrics::record_tool_parse_degradation("native");
            if arguments.trim().is_empty() {
                continue;
            }
            self.close_block(events);
            self.answer_started = true;
            let index = self.open(events, BlockType::Text, ContentBlockStart::Text { text: String::new() });
            events.push(StreamEvent::ContentBlockDelta {
                index,
                delta: Delta::TextDelta { text: arguments },
            });
            self.close_block(events);
        }
    }

    fn push_segments(&mut self, events: &mut Vec<StreamEvent>, segments: Vec<ThinkSegment>) {
        for segment in segments {
            match segment {
                ThinkSegment::Thinking(thinking) => self.push_thinking(events, thinking),
                ThinkSegment::Text(text) => self.push_text(events, text),
            }
        }
    }

    fn push_thinking(&mut self, events: &mut Vec<StreamEvent>, thinking: String) {
        if self.answer_started {
            debug!("Dropping {} bytes of reasoning that arrived after the answer", thinking.len());
            return;
        }
        // Whitespace ahead of a reasoning block only separated it from the prompt
        self.leading_whitespace.clear();
        let index = self.ensure_block(events, BlockType::Thinking);
        events.push(StreamEvent::ContentBlockDelta {
            index,
            delta: Delta::ThinkingDelta { thinking },
        });
    }

    fn push_text(&mut self, events: &mut Vec<StreamEvent>, text: String) {
        if self.ctx.tool_mode == ToolMode::Xml {
            self.text_buffer.push_str(&text);
            return;
        }
        let text = if self.answer_started {
            text
        } else if text.trim().is_empty() {
            // Not an answer yet: reasoning may still follow
            self.leading_whitespace.push_str(&text);
            return;
        } else {
            std::mem::take(&mut self.leading_whitespace) + &text
        };
        self.answer_started = true;
        let index = self.ensure_block(events, BlockType::Text);
        events.push(StreamEvent::ContentBlockDelta {
            index,
            delta: Delta::TextDelta { text },
        });
    }

    fn push_tool_fragment(&mut self, events: &mut Vec<StreamEvent>, call: ToolCall) {
        let slot_key = call.index.unwrap_or(0);

        if !self.tool_slots.contains_key(&slot_key) {
            // A new slot completes the previous one
            self.close_block(events);
            self.tool_slots.insert(
                slot_key,
                ToolSlot {
                    block_index: None,
                    id: call.id.clone().filter(|id| !id.is_empty()).unwrap_or_else(new_tool_use_id),
                    name: None,
                    pending_arguments: String::new(),
                    closed: false,
                },
            );
        }

        let Some(slot) = self.tool_slots.get_mut(&slot_key) else {
            return;
        };
        if slot.closed {
            warn!("Dropping arguments for already closed tool slot {}", slot_key);
            crate::metrics::record_tool_parse_degradation("native");
            return;
        }

        if let Some(name) = call.function.name.filter(|n| !n.is_empty()) {
            slot.name.get_or_insert(name);
        }
        if let Some(arguments) = call.function.arguments {
            slot.pending_arguments.push_str(&arguments);
        }

        // The block can only start once the tool name is known
        let Some(name) = slot.name.clone() else {
            return;
        };

        let index = match slot.block_index {
            Some(index) => index,
            None => {
                let id = slot.id.clone();
                self.close_block(events);
                let index = self.open(events, BlockType::ToolUse, ContentBlockStart::ToolUse {
                    id,
                    name,
                    input: serde_json::json!({}),
                });
                self.answer_started = true;
                self.had_tool_use = true;
                if let Some(slot) = self.tool_slots.get_mut(&slot_key) {
                    slot.block_index = Some(index);
                }
                index
            }
        };

        let partial_json = self
            .tool_slots
            .get_mut(&slot_key)
            .map(|slot| std::mem::take(&mut slot.pending_arguments))
            .unwrap_or_default();
        if !partial_json.is_empty() {
            events.push(StreamEvent::ContentBlockDelta {
                index,
                delta: Delta::InputJsonDelta { partial_json },
            });
        }
    }

    /// Emit a complete block as one start/delta/stop run.
    fn replay_block(&mut self, events: &mut Vec<StreamEvent>, block: ContentBlock) {
        match block {
            ContentBlock::Text { text, .. } => {
                self.answer_started = true;
                let index = self.open(events, BlockType::Text, ContentBlockStart::Text { text: String::new() });
                events.push(StreamEvent::ContentBlockDelta {
                    index,
                    delta: Delta::TextDelta { text },
                });
            }
            ContentBlock::ToolUse { id, name, input, .. } => {
                self.answer_started = true;
                self.had_tool_use = true;
                let index = self.open(events, BlockType::ToolUse, ContentBlockStart::ToolUse {
                    id,
                    name,
                    input: serde_json::json!({}),
                });
                events.push(StreamEvent::ContentBlockDelta {
                    index,
                    delta: Delta::InputJsonDelta {
                        partial_json: input.to_string(),
                    },
                });
            }
            other => {
                debug!("Skipping replay of unexpected block: {:?}", other);
                return;
            }
        }
        self.close_block(events);
    }

    /// Index of an open block of `kind`, opening a fresh one if needed.
    fn ensure_block(&mut self, events: &mut Vec<StreamEvent>, kind: BlockType) -> usize {
        if let Some((index, open_kind)) = self.open_block {
            if open_kind == kind {
                return index;
            }
        }
        self.close_block(events);
        let content_block = match kind {
            BlockType::Thinking => ContentBlockStart::Thinking { thinking: String::new() },
            _ => ContentBlockStart::Text { text: String::new() },
        };
        self.open(events, kind, content_block)
    }

    fn open(&mut self, events: &mut Vec<StreamEvent>, kind: BlockType, content_block: ContentBlockStart) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        events.push(StreamEvent::ContentBlockStart { index, content_block });
        self.open_block = Some((index, kind));
        self.phase = match self.phase {
            StreamPhase::Started => StreamPhase::Streaming,
            other => other,
        };
        index
    }

    fn close_block(&mut self, events: &mut Vec<StreamEvent>) {
        let Some((index, kind)) = self.open_block.take() else {
            return;
        };
        events.push(StreamEvent::ContentBlockStop { index });
        if kind == BlockType::ToolUse {
            for slot in self.tool_slots.values_mut() {
                if slot.block_index == Some(index) {
                    slot.closed = true;
                }
            }
        }
    }
}
