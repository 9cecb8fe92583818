//! Rendered log lines and the view buffers that hold them.
//!
//! The sink never touches a view directly. It emits `ViewUpdate`s tagged with a
//! channel name; whoever owns the `ViewBuffer`s (the TUI loop, or the headless
//! printer) applies them in FIFO order on its own task.

use std::collections::VecDeque;
use std::fmt::Write as _;

use crossterm::style::Stylize;
use ratatui::style::Color;
use strip_ansi_escapes::strip;

use crate::classify::Segment;
use crate::sink::LogLevel;

/// Default cap on the number of lines a view keeps.
pub const DEFAULT_MAX_LINES: usize = 10_000;

/// One colorized log entry as shown in a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLine {
    /// `"[HH:MM:SS] "`, rendered unstyled.
    pub timestamp: String,
    /// Rendered as `"LEVEL: "` in the level color.
    pub level: LogLevel,
    /// Classified message body.
    pub segments: Vec<Segment>,
}

impl RenderedLine {
    /// The level label including its trailing separator.
    pub fn level_label(&self) -> String {
        format!("{}: ", self.level.as_str())
    }

    /// The message body without styling.
    #[cfg(test)]
    pub fn message(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }

    /// The full line as plain text, without the trailing newline.
    #[cfg(test)]
    pub fn plain_text(&self) -> String {
        format!("{}{}{}", self.timestamp, self.level_label(), self.message())
    }
}

/// A change the sink asks a view to make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewUpdate {
    /// Append a rendered line to the view registered under `channel`.
    Append { channel: String, line: RenderedLine },
    /// Drop everything in the view registered under `channel`.
    Clear { channel: String },
}

impl ViewUpdate {
    pub fn channel(&self) -> &str {
        match self {
            ViewUpdate::Append { channel, .. } | ViewUpdate::Clear { channel } => channel,
        }
    }
}

/// An ordered, append-only list of rendered lines for one channel.
///
/// The oldest lines are dropped once `max_lines` is exceeded.
#[derive(Debug, Clone)]
pub struct ViewBuffer {
    channel: String,
    max_lines: usize,
    lines: VecDeque<RenderedLine>,
}

impl ViewBuffer {
    pub fn new(channel: impl Into<String>, max_lines: usize) -> Self {
        Self {
            channel: channel.into(),
            max_lines: max_lines.max(1),
            lines: VecDeque::with_capacity(max_lines.min(1024)),
        }
    }

    /// Adds a line to the buffer.
    ///
    /// Returns `true` if an old line was dropped to make room.
    pub fn push(&mut self, line: RenderedLine) -> bool {
        let mut dropped = false;
        self.lines.push_back(line);
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
            dropped = true;
        }
        dropped
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Applies `update` if it targets this buffer. Returns whether it did.
    pub fn apply(&mut self, update: &ViewUpdate) -> bool {
        if update.channel() != self.channel {
            return false;
        }
        match update {
            ViewUpdate::Append { line, .. } => {
                self.push(line.clone());
            }
            ViewUpdate::Clear { .. } => self.clear(),
        }
        true
    }

    /// Returns the number of lines currently in the buffer.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns an iterator over the lines in the buffer.
    pub fn iter(&self) -> impl Iterator<Item = &RenderedLine> {
        self.lines.iter()
    }
}

/// Cleans a line of process output for display.
///
/// ANSI escape codes are removed and a carriage-return redraw keeps only its
/// last segment. Invalid UTF-8 left behind by stripping is replaced.
pub fn sanitize_text(text: &str) -> String {
    // The escape stripper drops bare `\r`, so the redraw is collapsed first.
    let redrawn = strip_carriage(text);
    let stripped = strip(redrawn.as_bytes());
    String::from_utf8_lossy(&stripped).into_owned()
}

fn strip_carriage(text: &str) -> &str {
    text.rsplit('\r').next().unwrap_or("")
}

/// Formats a rendered line with ANSI colors for a plain terminal.
pub fn render_ansi(line: &RenderedLine) -> String {
    let mut out = String::new();
    out.push_str(&line.timestamp);
    let _ = write!(out, "{}", paint(&line.level_label(), line.level.color()));
    for segment in &line.segments {
        match &segment.style {
            Some(style) => {
                let _ = write!(out, "{}", paint(&segment.text, style.color));
            }
            None => out.push_str(&segment.text),
        }
    }
    out
}

fn paint(text: &str, color: Color) -> String {
    match color {
        Color::Rgb(r, g, b) => text.with(crossterm::style::Color::Rgb { r, g, b }).to_string(),
        _ => text.to_string(),
    }
}
