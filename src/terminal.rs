use crate::thinking::{ParseResult, THINKING_CLOSE, THINKING_OPEN};
use std::io::{self, Write};

const TRACE_HEADER: &str = "[thinking] ";
const TRACE_PENDING: &str = "[thinking...]";

/// Length of `text` without a trailing fragment that could still grow into `marker`.
fn settled_len(text: &str, marker: &str) -> usize {
    (1..marker.len())
        .rev()
        .find(|&k| text.ends_with(&marker[..k]))
        .map_or(text.len(), |k| text.len() - k)
}

/// Writes a streaming turn to a terminal: the trace to `err`, the answer to `out`.
///
/// Output is append-only, so text that may still turn into a marker is held back
/// until the next update settles it.
pub struct StreamPrinter<O: Write, E: Write> {
    out: O,
    err: E,
    show_thinking: bool,
    trace_open: bool,
    trace_done: bool,
    trace_printed: String,
    content_printed: String,
}

impl StreamPrinter<io::Stdout, io::Stderr> {
    pub fn stdio(show_thinking: bool) -> Self {
        Self::new(io::stdout(), io::stderr(), show_thinking)
    }
}

impl<O: Write, E: Write> StreamPrinter<O, E> {
    pub fn new(out: O, err: E, show_thinking: bool) -> Self {
        Self {
            out,
            err,
            show_thinking,
            trace_open: false,
            trace_done: false,
            trace_printed: String::new(),
            content_printed: String::new(),
        }
    }

    pub fn update(&mut self, result: &ParseResult) -> io::Result<()> {
        if result.is_thinking {
            let text = result.thinking_text();
            // Trailing whitespace waits too: the trace is trimmed once it closes.
            return self.update_trace(text[..settled_len(text, THINKING_CLOSE)].trim_end());
        }
        if result.has_trace() && !self.trace_done {
            self.complete_trace(result.thinking_text())?;
        }

        let content = result.content.as_str();
        let settled = if result.has_trace() {
            content.len()
        } else {
            settled_len(content, THINKING_OPEN)
        };
        self.write_content(&content[..settled])
    }

    /// Flushes everything held back once the stream has ended.
    pub fn finish(&mut self, result: &ParseResult) -> io::Result<()> {
        if result.is_thinking {
            self.update_trace(result.thinking_text().trim_end())?;
            self.close_trace()?;
        } else {
            if result.has_trace() && !self.trace_done {
                self.complete_trace(result.thinking_text())?;
            }
            self.write_content(&result.content)?;
        }
        if !self.content_printed.is_empty() {
            self.out.write_all(b"\n")?;
        }
        self.out.flush()
    }

    fn open_trace(&mut self) -> io::Result<()> {
        if !self.trace_open {
            self.trace_open = true;
            let header = if self.show_thinking {
                TRACE_HEADER
            } else {
                TRACE_PENDING
            };
            self.err.write_all(header.as_bytes())?;
        }
        Ok(())
    }

    fn update_trace(&mut self, settled: &str) -> io::Result<()> {
        self.open_trace()?;
        if self.show_thinking && settled.len() > self.trace_printed.len() {
            self.err
                .write_all(settled[self.trace_printed.len()..].as_bytes())?;
            self.trace_printed = settled.to_string();
        }
        self.err.flush()
    }

    fn complete_trace(&mut self, trace: &str) -> io::Result<()> {
        self.open_trace()?;
        if self.show_thinking {
            if let Some(rest) = trace.strip_prefix(self.trace_printed.trim()) {
                self.err.write_all(rest.as_bytes())?;
            }
        }
        self.trace_done = true;
        self.close_trace()
    }

    fn close_trace(&mut self) -> io::Result<()> {
        if self.trace_open {
            self.err.write_all(b"\n")?;
            self.trace_open = false;
        }
        self.err.flush()
    }

    fn write_content(&mut self, target: &str) -> io::Result<()> {
        match target.strip_prefix(self.content_printed.as_str()) {
            Some("") => return Ok(()),
            Some(tail) => self.out.write_all(tail.as_bytes())?,
            None => {
                // Re-derived text; start over on a fresh line.
                self.out.write_all(b"\n")?;
                self.out.write_all(target.as_bytes())?;
            }
        }
        self.content_printed = target.to_string();
        self.out.flush()
    }
}
