// Translation module - Anthropic ↔ OpenAI chat-completions translation
// Author: kelexine (https://github.com/kelexine)

pub mod request;
pub mod response;
pub mod streaming;

pub use request::translate_request;
pub use response::{map_finish_reason, translate_response};
pub use streaming::{StreamPhase, StreamTranslator};

use crate::tools::{ToolMode, XmlToolParser};
use crate::transform::{Pipeline, TransformerKind};

/// Everything the response side needs to know about one request.
#[derive(Debug, Clone)]
pub struct TranslationContext {
    /// Model id reported back to the client.
    pub model: String,
    pub pipeline: Pipeline,
    pub tool_mode: ToolMode,
    pub xml_parser: XmlToolParser,
}

impl TranslationContext {
    pub fn new(model: impl Into<String>, pipeline: Pipeline, tool_mode: ToolMode, xml_parser: XmlToolParser) -> Self {
        Self {
            model: model.into(),
            pipeline,
            tool_mode,
            xml_parser,
        }
    }

    /// Plain context: no transformers, native tools.
    pub fn passthrough(model: impl Into<String>) -> Self {
        Self::new(model, Pipeline::default(), ToolMode::Native, XmlToolParser::default())
    }

    pub fn splits_think_tags(&self) -> bool {
        self.pipeline.contains(TransformerKind::ThinkTags)
    }
}
