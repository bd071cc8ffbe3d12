//! Splits a streamed model response into its `<thinking>` trace and the final answer.
//!
//! The parser is a pure function of the whole buffer received so far. Callers keep
//! appending chunks to their own buffer and re-run [`parse`] after every chunk; the
//! result never depends on how the text was chunked.
//!
//! ```text
//! <thinking>step 1</thinking>The answer is 42.
//! ```
//!
//! Only the first opening marker and the first closing marker after it delimit the
//! trace. Anything after that closing marker is answer text, literal markers included.

/// Marker that opens the reasoning trace.
pub const THINKING_OPEN: &str = "<thinking>";

/// Marker that closes the reasoning trace.
pub const THINKING_CLOSE: &str = "</thinking>";

/// Classification of a response buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParseResult {
    /// Trace text. `None` until an opening marker has been seen.
    pub thinking: Option<String>,
    /// Answer text with the trace region removed.
    pub content: String,
    /// True while the trace is open and no closing marker has arrived.
    pub is_thinking: bool,
}

impl ParseResult {
    fn plain(buffer: &str) -> Self {
        Self {
            thinking: None,
            content: buffer.trim().to_string(),
            is_thinking: false,
        }
    }

    /// Whether an opening marker has been seen, i.e. a trace panel applies.
    pub fn has_trace(&self) -> bool {
        self.thinking.is_some()
    }

    /// Trace text, or the empty string when there is none.
    pub fn thinking_text(&self) -> &str {
        self.thinking.as_deref().unwrap_or_default()
    }
}

/// Classifies `buffer` into trace, answer and the still-thinking flag.
///
/// Never fails: a buffer without markers is plain text, a buffer that ends inside
/// the trace is reported as still thinking. While thinking, the trace is returned
/// untrimmed so that it only ever grows as more text is appended.
pub fn parse(buffer: &str) -> ParseResult {
    let Some(open) = buffer.find(THINKING_OPEN) else {
        return ParseResult::plain(buffer);
    };

    let body = &buffer[open + THINKING_OPEN.len()..];
    let Some(close) = body.find(THINKING_CLOSE) else {
        return ParseResult {
            thinking: Some(body.to_string()),
            content: String::new(),
            is_thinking: true,
        };
    };

    let after = &body[close + THINKING_CLOSE.len()..];
    let mut content = String::with_capacity(open + after.len());
    content.push_str(&buffer[..open]);
    content.push_str(after);

    ParseResult {
        thinking: Some(body[..close].trim().to_string()),
        content: content.trim().to_string(),
        is_thinking: false,
    }
}
