// Upstream SSE parsing
// Author: kelexine (https://github.com/kelexine)

use crate::error::{ProxyError, Result};
use crate::models::openai::ChatCompletionChunk;
use bytes::Bytes;
use futures::stream::Stream;
use serde_json::Value;
use std::pin::Pin;
use tracing::{debug, warn};

/// Parsed chat-completions chunks from an OpenAI-compatible stream.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk>> + Send>>;

/// Raw SSE bytes from an Anthropic-native stream.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Parse an SSE byte stream into chat-completions chunks.
///
/// Events are split on a blank line; bytes are buffered until an event is
/// complete so multi-byte characters split across reads survive. `[DONE]`
/// ends the stream. An in-band `{"error": …}` payload becomes a
/// `StreamTransport` error.
pub fn parse_chunk_stream<S, E>(byte_stream: S) -> impl Stream<Item = Result<ChatCompletionChunk>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    use futures::StreamExt;

    async_stream::stream! {
        let mut buffer: Vec<u8> = Vec::new();

        futures::pin_mut!(byte_stream);

        'read: while let Some(chunk_result) = byte_stream.next().await {
            match chunk_result {
                Ok(chunk) => {
                    debug!("Received chunk: {} bytes", chunk.len());
                    buffer.extend_from_slice(&chunk);

                    while let Some((event_end, separator_len)) = find_event_end(&buffer) {
                        let event: Vec<u8> = buffer.drain(..event_end + separator_len).collect();
                        let event = String::from_utf8_lossy(&event[..event_end]);

                        match parse_sse_event(&event) {
                            SseEvent::Chunk(chunk) => yield Ok(*chunk),
                            SseEvent::Error(message) => {
                                yield Err(ProxyError::StreamTransport(message));
                                buffer.clear();
                                break 'read;
                            }
                            SseEvent::Done => {
                                debug!("Upstream sent [DONE]");
                                buffer.clear();
                                break 'read;
                            }
                            SseEvent::Skip => {}
                        }
                    }
                }
                Err(e) => {
                    warn!("Stream error: {}", e);
                    yield Err(ProxyError::StreamTransport(e.to_string()));
                    buffer.clear();
                    break;
                }
            }
        }

        // Final event without a trailing blank line
        let rest = String::from_utf8_lossy(&buffer).to_string();
        if !rest.trim().is_empty() {
            debug!("Processing remaining buffer: {} chars", rest.len());
            match parse_sse_event(&rest) {
                SseEvent::Chunk(chunk) => yield Ok(*chunk),
                SseEvent::Error(message) => yield Err(ProxyError::StreamTransport(message)),
                SseEvent::Done | SseEvent::Skip => {}
            }
        }

        debug!("Upstream SSE stream ended");
    }
}

/// Pass an Anthropic-native SSE body through untouched.
pub fn passthrough_stream<S, E>(byte_stream: S) -> impl Stream<Item = Result<Bytes>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    use futures::StreamExt;

    byte_stream.map(|chunk| chunk.map_err(|e| ProxyError::StreamTransport(e.to_string())))
}

#[derive(Debug)]
enum SseEvent {
    Chunk(Box<ChatCompletionChunk>),
    Error(String),
    Done,
    Skip,
}

fn find_event_end(buffer: &[u8]) -> Option<(usize, usize)> {
    (0..buffer.len()).find_map(|i| {
        let rest = &buffer[i..];
        if rest.starts_with(b"\n\n") {
            Some((i, 2))
        } else if rest.starts_with(b"\r\n\r\n") {
            Some((i, 4))
        } else {
            None
        }
    })
}

/// Join the `data:` lines of one event. Comments and other fields are ignored.
fn event_data(event: &str) -> Option<String> {
    let lines: Vec<&str> = event
        .lines()
        .filter_map(|line| line.trim_end_matches('\r').strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();

    (!lines.is_empty()).then(|| lines.join("\n"))
}

fn parse_sse_event(event: &str) -> SseEvent {
    let Some(data) = event_data(event) else {
        return SseEvent::Skip;
    };
    let data = data.trim();

    if data.is_empty() {
        return SseEvent::Skip;
    }
    if data == "[DONE]" {
        return SseEvent::Done;
    }

    let parsed: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse SSE JSON: {}", e);
            debug!("Raw data: {}", data.chars().take(200).collect::<String>());
            return SseEvent::Skip;
        }
    };

    if let Some(error) = parsed.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        warn!("Upstream reported an in-stream error: {}", message);
        return SseEvent::Error(message);
    }

    match serde_json::from_value::<ChatCompletionChunk>(parsed) {
        Ok(chunk) => SseEvent::Chunk(Box::new(chunk)),
        Err(e) => {
            warn!("Failed to convert SSE event to a chat-completions chunk: {}", e);
            SseEvent::Skip
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn collect(parts: Vec<&'static [u8]>) -> Vec<Result<ChatCompletionChunk>> {
        let source = futures::stream::iter(
            parts
                .into_iter()
                .map(|p| Ok::<_, std::io::Error>(Bytes::from_static(p))),
        );
        parse_chunk_stream(source).collect().await
    }

    #[tokio::test]
    async fn test_parses_events_and_stops_at_done() {
        let items = collect(vec![
            b"data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n".as_slice(),
            b"data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\ndata: [DONE]\n\n".as_slice(),
            b"data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"ignored\"}}]}\n\n".as_slice(),
        ])
        .await;

        let texts: Vec<String> = items
            .into_iter()
            .map(|item| item.unwrap().choices[0].delta.content.clone().unwrap_or_default())
            .collect();
        assert_eq!(texts, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_event_split_across_reads() {
        let items = collect(vec![
            b"data: {\"choices\":[{\"index\":0,\"del".as_slice(),
            b"ta\":{\"content\":\"caf\xc3".as_slice(),
            b"\xa9\"}}]}\r\n\r\n".as_slice(),
        ])
        .await;

        assert_eq!(items.len(), 1);
        let chunk = items.into_iter().next().unwrap().unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("café"));
    }

    #[tokio::test]
    async fn test_trailing_event_without_blank_line() {
        let items = collect(vec![
            b": keep-alive\n\n".as_slice(),
            b"data: {\"choices\":[],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":2}}".as_slice(),
        ])
        .await;

        assert_eq!(items.len(), 1);
        let chunk = items.into_iter().next().unwrap().unwrap();
        assert_eq!(chunk.usage.unwrap().completion_tokens, 2);
    }

    #[tokio::test]
    async fn test_in_band_error_ends_stream() {
        let items = collect(vec![
            b"data: {\"error\":{\"message\":\"overloaded\",\"code\":503}}\n\n".as_slice(),
            b"data: {\"choices\":[]}\n\n".as_slice(),
        ])
        .await;

        assert_eq!(items.len(), 1);
        match &items[0] {
            Err(ProxyError::StreamTransport(msg)) => assert_eq!(msg, "overloaded"),
            other => panic!("expected transport error, got {:?}", other),
        }
    }

    #[test]
    fn test_event_without_data_is_skipped() {
        assert!(matches!(parse_sse_event("event: ping"), SseEvent::Skip));
        assert!(matches!(parse_sse_event("data: not json"), SseEvent::Skip));
    }
}
