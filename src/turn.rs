use crate::thinking::{parse, ParseResult};
use tracing::debug;

/// Where a single model turn stands, derived from its buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnPhase {
    NotStarted,
    StreamingPlain,
    StreamingThinking,
    ThinkingClosed,
    Done,
}

impl TurnPhase {
    fn classify(buffer: &str, result: &ParseResult) -> Self {
        if buffer.is_empty() {
            Self::NotStarted
        } else if result.is_thinking {
            Self::StreamingThinking
        } else if result.has_trace() {
            Self::ThinkingClosed
        } else {
            Self::StreamingPlain
        }
    }
}

/// Change of one text field between two consecutive parses.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum FieldDelta {
    #[default]
    Unchanged,
    /// New text was appended to what was already shown.
    Append(String),
    /// The field was re-derived; show this text instead of the previous one.
    Replace(String),
}

impl FieldDelta {
    fn between(previous: &str, next: &str) -> Self {
        if previous == next {
            Self::Unchanged
        } else if let Some(tail) = next.strip_prefix(previous) {
            Self::Append(tail.to_string())
        } else {
            Self::Replace(next.to_string())
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextDelta {
    pub thinking: FieldDelta,
    pub content: FieldDelta,
}

impl TextDelta {
    fn between(previous: &ParseResult, next: &ParseResult) -> Self {
        Self {
            thinking: FieldDelta::between(previous.thinking_text(), next.thinking_text()),
            content: FieldDelta::between(&previous.content, &next.content),
        }
    }
}

/// Accumulator for one streamed model turn.
///
/// Owns the growing response buffer and re-classifies the whole of it after each
/// chunk. Dropping the turn discards the buffer; [`Turn::finish`] freezes the
/// final classification for history.
#[derive(Clone, Debug)]
pub struct Turn {
    buffer: String,
    result: ParseResult,
    phase: TurnPhase,
    chunks: usize,
}

impl Default for Turn {
    fn default() -> Self {
        Self::new()
    }
}

impl Turn {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            result: ParseResult::default(),
            phase: TurnPhase::NotStarted,
            chunks: 0,
        }
    }

    pub fn push(&mut self, chunk: &str) -> ParseResult {
        self.push_delta(chunk);
        self.result.clone()
    }

    /// Appends `chunk` and reports what changed in the visible text.
    pub fn push_delta(&mut self, chunk: &str) -> TextDelta {
        if chunk.is_empty() {
            return TextDelta::default();
        }

        self.buffer.push_str(chunk);
        self.chunks += 1;

        let next = parse(&self.buffer);
        let delta = TextDelta::between(&self.result, &next);
        let phase = TurnPhase::classify(&self.buffer, &next);
        if phase != self.phase {
            debug!(from = ?self.phase, to = ?phase, chunks = self.chunks, "turn phase changed");
            self.phase = phase;
        }
        self.result = next;
        delta
    }

    /// Latest classification of the buffer.
    pub fn result(&self) -> &ParseResult {
        &self.result
    }

    /// Re-parses the buffer from scratch.
    pub fn snapshot(&self) -> ParseResult {
        parse(&self.buffer)
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Marks the stream as terminated and freezes the last classification.
    pub fn finish(self) -> FinishedTurn {
        debug!(
            chunks = self.chunks,
            bytes = self.buffer.len(),
            complete = !self.result.is_thinking,
            "turn finished"
        );
        FinishedTurn {
            result: self.result,
            raw: self.buffer,
            chunks: self.chunks,
        }
    }
}

/// A turn whose stream has ended. Its classification no longer changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinishedTurn {
    pub result: ParseResult,
    pub raw: String,
    pub chunks: usize,
}

impl FinishedTurn {
    pub fn phase(&self) -> TurnPhase {
        TurnPhase::Done
    }

    /// False when the stream ended inside an unclosed trace.
    pub fn is_complete(&self) -> bool {
        !self.result.is_thinking
    }
}
