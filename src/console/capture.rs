//! Capture Window - diverts console output into a buffer while a command runs.
//!
//! The console protocol has no request/response framing, so "what did the
//! command print" is answered by collecting every line seen during a fixed window.

use serde::Serialize;

/// Marker appended by [`CapturedOutput::truncated`].
pub const TRUNCATION_MARKER: &str = "… (truncated)";

/// Mode switch plus append-only buffer. Only one window is open at a time.
#[derive(Debug, Default)]
pub struct CaptureWindow {
    active: bool,
    lines: Vec<String>,
}

impl CaptureWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the buffer and start capturing.
    pub fn open(&mut self) {
        self.lines.clear();
        self.active = true;
    }

    /// Append a line if the window is open. Returns whether it was captured.
    pub fn feed(&mut self, content: &str) -> bool {
        if self.active {
            self.lines.push(content.to_string());
        }
        self.active
    }

    /// Stop capturing and hand back everything collected.
    pub fn close(&mut self) -> Vec<String> {
        self.active = false;
        std::mem::take(&mut self.lines)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Everything a command printed inside its capture window.
///
/// The full capture is always kept; bounding it for a chat reply is up to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapturedOutput {
    lines: Vec<String>,
}

impl CapturedOutput {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    /// Lines joined by `\n`. Empty when nothing was printed.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Length of [`text`](Self::text) in characters.
    pub fn char_count(&self) -> usize {
        let separators = self.lines.len().saturating_sub(1);
        self.lines.iter().map(|l| l.chars().count()).sum::<usize>() + separators
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Whether `truncated(max_lines, max_chars)` would cut anything.
    pub fn exceeds(&self, max_lines: usize, max_chars: usize) -> bool {
        self.line_count() > max_lines || self.char_count() > max_chars
    }

    /// The text bounded to `max_lines` lines and `max_chars` characters,
    /// with [`TRUNCATION_MARKER`] on its own line when anything was dropped.
    pub fn truncated(&self, max_lines: usize, max_chars: usize) -> String {
        if !self.exceeds(max_lines, max_chars) {
            return self.text();
        }

        let mut out = String::new();
        let mut used = 0;
        for (i, line) in self.lines.iter().take(max_lines).enumerate() {
            let sep = usize::from(i > 0);
            let len = line.chars().count();
            if used + sep + len > max_chars {
                let room = max_chars.saturating_sub(used + sep);
                if room > 0 {
                    if sep == 1 {
                        out.push('\n');
                    }
                    out.extend(line.chars().take(room));
                }
                break;
            }
            if sep == 1 {
                out.push('\n');
            }
            out.push_str(line);
            used += sep + len;
        }

        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(TRUNCATION_MARKER);
        out
    }
}
