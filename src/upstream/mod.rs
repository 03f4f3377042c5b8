//! Outbound calls to the configured upstream.
//!
//! - `client`: reqwest client wrapped in the retry/budget controller.
//! - `streaming`: SSE parsing for chat-completions streams and raw
//!   pass-through for Anthropic-native streams.
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod client;
pub mod streaming;

pub use client::UpstreamClient;
pub use streaming::{parse_chunk_stream, ByteStream, ChunkStream};
