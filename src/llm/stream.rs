//! Streaming response consumption.
//!
//! The model endpoints deliver replies as SSE fragments. Everything here is
//! transport-agnostic: [`SseLineBuffer`] reassembles lines from arbitrary
//! byte chunks and [`ResponseAccumulator`] grows the reply text fragment by
//! fragment, classifying how the stream ended.
//!
//! Truncation policy: when a stream ends any way other than a terminal
//! sentinel or finish reason, the accumulated partial text is kept and
//! persisted with [`TRUNCATION_MARKER`] appended, and the failure is
//! surfaced to the caller so the user can retry.

/// Appended to a stored assistant message whose stream did not complete.
pub const TRUNCATION_MARKER: &str = "\n\n[response interrupted]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// Terminal sentinel or finish reason was observed.
    Completed,
    /// The transport failed, or the stream closed with no terminal sentinel.
    Interrupted(String),
    /// Cancelled because a newer submission superseded this one.
    Superseded,
}

#[derive(Debug, Clone)]
pub struct StreamOutcome {
    pub text: String,
    pub end: StreamEnd,
}

impl StreamOutcome {
    pub fn is_complete(&self) -> bool {
        self.end == StreamEnd::Completed
    }

    /// The text to persist, or `None` when nothing arrived at all (an
    /// empty assistant message is never stored).
    pub fn stored_text(&self) -> Option<String> {
        if self.text.is_empty() {
            return None;
        }
        if self.is_complete() {
            Some(self.text.clone())
        } else {
            Some(format!("{}{}", self.text, TRUNCATION_MARKER))
        }
    }
}

/// Accumulates fragments in arrival order into one growing string. The
/// running text is available after every fragment.
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    text: String,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fragment and returns the running text.
    pub fn push(&mut self, fragment: &str) -> &str {
        self.text.push_str(fragment);
        &self.text
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn finish(self) -> StreamOutcome {
        StreamOutcome {
            text: self.text,
            end: StreamEnd::Completed,
        }
    }

    pub fn interrupt(self, reason: impl Into<String>) -> StreamOutcome {
        StreamOutcome {
            text: self.text,
            end: StreamEnd::Interrupted(reason.into()),
        }
    }

    pub fn supersede(self) -> StreamOutcome {
        StreamOutcome {
            text: self.text,
            end: StreamEnd::Superseded,
        }
    }
}

/// Reassembles newline-delimited SSE lines from byte chunks that may split
/// anywhere, including mid-codepoint on the wire.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buf: String,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every complete, trimmed line it closed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.push_str(&String::from_utf8_lossy(bytes));
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let line = self.buf[..pos].trim().to_string();
            self.buf.drain(..=pos);
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }
}
