//! Data models for the Anthropic and OpenAI APIs.
//!
//! This module contains the type definitions for request/response bodies used by:
//! - The inbound Anthropic-compatible API (`anthropic`)
//! - The upstream OpenAI chat-completions API (`openai`)
//! - Model name mapping utilities (`mapping`)
//! - Streaming event types (`streaming`)

// Author: kelexine (https://github.com/kelexine)

pub mod anthropic;
pub mod mapping;
pub mod openai;
pub mod streaming;

pub use anthropic::{ContentBlock, Message, MessageContent, MessagesRequest, MessagesResponse, Tool};
pub use mapping::map_model;
pub use openai::{AssistantMessage, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse};
pub use streaming::*;
