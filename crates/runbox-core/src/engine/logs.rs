//! Line framing for exec output.
//!
//! The attach stream delivers arbitrarily sized chunks per stream; each sink
//! buffers until a newline and emits one [`LogLine`] per line, with a final
//! flush of any unterminated tail when the stream closes.

use crate::docker::LogStream;

/// One newline-terminated fragment of the child's output, without the
/// trailing newline, tagged with its originating stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub stream: LogStream,
    pub text: String,
}

impl LogLine {
    pub fn stdout(text: impl Into<String>) -> Self {
        LogLine {
            stream: LogStream::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        LogLine {
            stream: LogStream::Stderr,
            text: text.into(),
        }
    }
}

/// Ordered transcript shared by the two sinks, with an optional cumulative
/// character budget. When the budget is exceeded the offending line is cut
/// at the boundary and the transcript refuses further input.
pub(crate) struct Transcript {
    lines: Vec<LogLine>,
    remaining: Option<usize>,
    limit_reached: bool,
}

impl Transcript {
    pub fn new(output_limit: Option<usize>) -> Self {
        Transcript {
            lines: Vec::new(),
            remaining: output_limit,
            limit_reached: false,
        }
    }

    /// Append a line; returns false once the budget is exhausted and reads
    /// should stop.
    pub fn push(&mut self, stream: LogStream, text: String) -> bool {
        if self.limit_reached {
            return false;
        }
        match self.remaining {
            Some(remaining) if text.chars().count() > remaining => {
                let cut: String = text.chars().take(remaining).collect();
                self.lines.push(LogLine { stream, text: cut });
                self.remaining = Some(0);
                self.limit_reached = true;
                false
            }
            Some(remaining) => {
                self.remaining = Some(remaining - text.chars().count());
                self.lines.push(LogLine { stream, text });
                true
            }
            None => {
                self.lines.push(LogLine { stream, text });
                true
            }
        }
    }

    pub fn finish(self) -> (Vec<LogLine>, bool) {
        (self.lines, self.limit_reached)
    }
}

/// Newline-framing sink for one stream.
pub(crate) struct LogSink {
    stream: LogStream,
    buffer: Vec<u8>,
}

impl LogSink {
    pub fn new(stream: LogStream) -> Self {
        LogSink {
            stream,
            buffer: Vec::new(),
        }
    }

    /// Feed a chunk; emits one line per newline seen. Returns false when the
    /// transcript stopped accepting input.
    pub fn write(&mut self, bytes: &[u8], transcript: &mut Transcript) -> bool {
        self.buffer.extend_from_slice(bytes);
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).take(pos).collect();
            let text = String::from_utf8_lossy(&line).into_owned();
            if !transcript.push(self.stream, text) {
                self.buffer.clear();
                return false;
            }
        }
        true
    }

    /// Flush any unterminated tail as a final line.
    pub fn close(&mut self, transcript: &mut Transcript) {
        if !self.buffer.is_empty() {
            let text = String::from_utf8_lossy(&self.buffer).into_owned();
            self.buffer.clear();
            transcript.push(self.stream, text);
        }
    }
}
