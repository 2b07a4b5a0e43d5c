//! Token-to-frame chunking.
//!
//! Language-model tokens arrive a few characters at a time. Synthesizing each
//! token separately sounds choppy, while waiting for whole sentences delays the
//! first audio. The chunker cuts the token stream at punctuation and spaces so
//! that every frame handed to the synthesis service ends on a clause boundary,
//! followed by one separating space.
use async_stream::try_stream;
use futures_core::Stream;

/// Characters a frame may end on.
pub const BOUNDARY_CHARS: [char; 14] = [
    '.', ',', '?', '!', ';', ':', '—', '-', '(', ')', '[', ']', '}', ' ',
];

fn is_boundary(c: char) -> bool {
    BOUNDARY_CHARS.contains(&c)
}

/// Accumulates tokens and emits frames at boundary characters.
///
/// One chunker serves exactly one run; it keeps no state beyond its buffer.
#[derive(Debug, Default)]
pub struct TextChunker {
    buffer: String,
}

impl TextChunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one token. Returns a frame when the token completes one.
    ///
    /// Absent and empty tokens are ignored.
    pub fn push(&mut self, token: Option<&str>) -> Option<String> {
        let token = match token {
            Some(t) if !t.is_empty() => t,
            _ => return None,
        };

        if self.buffer.chars().next_back().is_some_and(is_boundary) {
            let mut frame = std::mem::replace(&mut self.buffer, token.to_string());
            frame.push(' ');
            return Some(frame);
        }

        let mut chars = token.chars();
        match chars.next() {
            Some(first) if is_boundary(first) => {
                let mut frame = std::mem::replace(&mut self.buffer, chars.as_str().to_string());
                frame.push(first);
                frame.push(' ');
                Some(frame)
            }
            _ => {
                self.buffer.push_str(token);
                None
            }
        }
    }

    /// Flush whatever is left once the token source is exhausted.
    pub fn finish(self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer + " ")
        }
    }

    pub fn buffered(&self) -> &str {
        &self.buffer
    }
}

/// Lazily chunk a fallible token stream into text frames.
///
/// The first token error ends the stream after being yielded.
pub fn chunk_text<S, E>(tokens: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<Option<String>, E>>,
{
    try_stream! {
        let mut chunker = TextChunker::new();
        for await token in tokens {
            if let Some(frame) = chunker.push(token?.as_deref()) {
                yield frame;
            }
        }
        if let Some(frame) = chunker.finish() {
            yield frame;
        }
    }
}
