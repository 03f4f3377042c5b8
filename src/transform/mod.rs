//! Per-model request/response transformers.
//!
//! A capability profile names an ordered transformer list. [`Pipeline::forward`]
//! applies them in that order to the outbound request; [`Pipeline::reverse`]
//! applies them in reverse order to the assistant message (or stream delta)
//! coming back. Each transformer only touches fields it owns, and reversing a
//! payload that carries none of its markers returns it unchanged.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod builtin;
mod think_tags;

pub use builtin::{EnhanceTool, MaxTokens, Reasoning, ThinkTags};
pub use think_tags::{split_think_tags, ThinkSegment, ThinkTagSplitter};

use crate::models::openai::{AssistantMessage, ChatCompletionRequest};
use std::fmt;

/// Per-request inputs the transformers may read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOptions {
    pub max_tokens_override: Option<u32>,
    pub thinking_budget: Option<u32>,
}

/// A pair of pure request/response mutators.
pub trait Transformer: Send + Sync {
    /// Name used in configuration and logs.
    fn name(&self) -> &'static str;

    fn forward(&self, request: ChatCompletionRequest, _opts: &TransformOptions) -> ChatCompletionRequest {
        request
    }

    fn reverse(&self, message: AssistantMessage, _opts: &TransformOptions) -> AssistantMessage {
        message
    }

    /// Reverse one stream delta. Defaults to [`Transformer::reverse`].
    fn reverse_delta(&self, delta: AssistantMessage, opts: &TransformOptions) -> AssistantMessage {
        self.reverse(delta, opts)
    }
}

/// Closed set of transformers a profile can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformerKind {
    MaxToken,
    EnhanceTool,
    Reasoning,
    ThinkTags,
}

static MAX_TOKENS: MaxTokens = MaxTokens;
static ENHANCE_TOOL: EnhanceTool = EnhanceTool;
static REASONING: Reasoning = Reasoning;
static THINK_TAGS: ThinkTags = ThinkTags;

impl TransformerKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "maxtoken" | "maxtokens" => Some(Self::MaxToken),
            "enhancetool" => Some(Self::EnhanceTool),
            "reasoning" => Some(Self::Reasoning),
            "thinktags" | "think_tags" => Some(Self::ThinkTags),
            _ => None,
        }
    }

    pub fn transformer(self) -> &'static dyn Transformer {
        match self {
            Self::MaxToken => &MAX_TOKENS,
            Self::EnhanceTool => &ENHANCE_TOOL,
            Self::Reasoning => &REASONING,
            Self::ThinkTags => &THINK_TAGS,
        }
    }

    pub fn name(self) -> &'static str {
        self.transformer().name()
    }
}

impl fmt::Display for TransformerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Ordered transformer chain for one request.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    kinds: Vec<TransformerKind>,
    opts: TransformOptions,
}

impl Pipeline {
    pub fn new(kinds: &[TransformerKind], opts: TransformOptions) -> Self {
        Self {
            kinds: kinds.to_vec(),
            opts,
        }
    }

    pub fn contains(&self, kind: TransformerKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn forward(&self, request: ChatCompletionRequest) -> ChatCompletionRequest {
        self.kinds
            .iter()
            .fold(request, |req, kind| kind.transformer().forward(req, &self.opts))
    }

    pub fn reverse(&self, message: AssistantMessage) -> AssistantMessage {
        self.kinds
            .iter()
            .rev()
            .fold(message, |msg, kind| kind.transformer().reverse(msg, &self.opts))
    }

    pub fn reverse_delta(&self, delta: AssistantMessage) -> AssistantMessage {
        self.kinds
            .iter()
            .rev()
            .fold(delta, |msg, kind| kind.transformer().reverse_delta(msg, &self.opts))
    }
}
