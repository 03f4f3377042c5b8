// Stateful <think>…</think> splitter for streamed and complete text
// Author: kelexine (https://github.com/kelexine)

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

/// A run of text classified as reasoning or answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThinkSegment {
    Thinking(String),
    Text(String),
}

/// Splits `<think>` spans out of text that may arrive in arbitrary chunks.
///
/// A tag split across chunk boundaries is held back until the next chunk
/// decides whether it really is a tag.
#[derive(Debug, Default)]
pub struct ThinkTagSplitter {
    pending: String,
    in_thinking: bool,
}

impl ThinkTagSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_thinking(&self) -> bool {
        self.in_thinking
    }

    /// Feed one chunk and return the segments it completes.
    pub fn push(&mut self, chunk: &str) -> Vec<ThinkSegment> {
        let mut segments = Vec::new();
        let mut text = std::mem::take(&mut self.pending);
        text.push_str(chunk);

        loop {
            let tag = if self.in_thinking { CLOSE_TAG } else { OPEN_TAG };

            if let Some(idx) = text.find(tag) {
                self.emit(&mut segments, &text[..idx]);
                self.in_thinking = !self.in_thinking;
                text = text[idx + tag.len()..].to_string();
                continue;
            }

            match find_partial_tag(&text, tag) {
                Some(partial) => {
                    self.emit(&mut segments, &text[..partial]);
                    self.pending = text[partial..].to_string();
                }
                None => self.emit(&mut segments, &text),
            }
            break;
        }

        segments
    }

    /// Flush a held-back partial tag at end of input. It was never completed,
    /// so it is emitted as content of the current kind.
    pub fn finish(&mut self) -> Option<ThinkSegment> {
        let rest = std::mem::take(&mut self.pending);
        let mut segments = Vec::new();
        self.emit(&mut segments, &rest);
        segments.pop()
    }

    fn emit(&self, segments: &mut Vec<ThinkSegment>, content: &str) {
        if content.is_empty() {
            return;
        }
        let segment = if self.in_thinking {
            ThinkSegment::Thinking(content.to_string())
        } else {
            ThinkSegment::Text(content.to_string())
        };
        segments.push(segment);
    }
}

/// Index where a proper prefix of `tag` starts at the end of `text`.
fn find_partial_tag(text: &str, tag: &str) -> Option<usize> {
    (1..tag.len())
        .rev()
        .find(|&len| text.ends_with(&tag[..len]))
        .map(|len| text.len() - len)
}

/// Split complete text into (thinking, answer). Returns `None` when the text
/// carries no `<think>` tag at all.
pub fn split_think_tags(text: &str) -> Option<(String, String)> {
    if !text.contains(OPEN_TAG) {
        return None;
    }

    let mut splitter = ThinkTagSplitter::new();
    let mut thinking = String::new();
    let mut answer = String::new();

    let segments = splitter.push(text).into_iter().chain(splitter.finish());
    for segment in segments {
        match segment {
            ThinkSegment::Thinking(t) => thinking.push_str(&t),
            ThinkSegment::Text(t) => answer.push_str(&t),
        }
    }

    Some((thinking.trim().to_string(), answer.trim_start().to_string()))
}
