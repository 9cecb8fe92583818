//! Keyword highlighting for log messages.
//!
//! The `Classifier` splits a message into an ordered list of `Segment`s whose
//! concatenation is the original message. Segments that matched a keyword rule
//! carry a `KeywordStyle`; everything in between is left unstyled.
//!
//! Two kinds of rules exist: custom rules loaded from the keyword file (exact,
//! case-sensitive substrings) and the built-in default rules (case-insensitive,
//! word-bounded regexes). Custom matches always win over default ones.

use std::sync::OnceLock;

use ratatui::style::Color;
use regex::{Regex, RegexBuilder};

/// Fixed colors shared by level labels and the default keyword table.
pub mod palette {
    use ratatui::style::Color;

    pub const SUCCESS: Color = Color::Rgb(0x00, 0x80, 0x00);
    pub const ERROR: Color = Color::Rgb(0xFF, 0x00, 0x00);
    pub const WARNING: Color = Color::Rgb(0xFF, 0x8C, 0x00);
    pub const INFO: Color = Color::Rgb(0x00, 0x00, 0xFF);
    pub const DEBUG: Color = Color::Rgb(0x80, 0x80, 0x80);
    pub const DEVICE: Color = Color::Rgb(0x80, 0x00, 0x80);
    pub const PORT: Color = Color::Rgb(0x00, 0x80, 0x80);
    pub const ADB: Color = Color::Rgb(0xFF, 0x45, 0x00);
    pub const USB: Color = Color::Rgb(0x4B, 0x00, 0x82);
    pub const FOTA: Color = Color::Rgb(0xFF, 0x14, 0x93);
}

/// Style attached to a highlighted span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordStyle {
    /// Name of the color tag (`"ADB"`, `"PORT"`, `"custom_<keyword>"`, ...).
    pub tag: String,
    /// Foreground color of the span.
    pub color: Color,
}

/// A contiguous piece of a classified message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub style: Option<KeywordStyle>,
}

impl Segment {
    fn plain(text: &str) -> Self {
        Self {
            text: text.to_string(),
            style: None,
        }
    }
}

/// A user supplied `keyword=#RRGGBB` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomRule {
    pub keyword: String,
    pub color: Color,
}

impl CustomRule {
    pub fn new(keyword: impl Into<String>, color: Color) -> Self {
        Self {
            keyword: keyword.into(),
            color,
        }
    }

    fn style(&self) -> KeywordStyle {
        KeywordStyle {
            tag: format!("custom_{}", self.keyword),
            color: self.color,
        }
    }
}

struct DefaultRule {
    regex: Regex,
    tag: &'static str,
    color: Color,
}

// Declaration order matters: an earlier pattern wins over a later overlapping one.
const DEFAULT_PATTERNS: &[(&str, &str, Color)] = &[
    (r"\bADB\b", "ADB", palette::ADB),
    (r"\bUSB\b", "USB", palette::USB),
    (r"\bCOM\d+\b", "PORT", palette::PORT),
    (r"\b(?:DM\s+PORT|DM_PORT)\b", "PORT", palette::PORT),
    (r"\bFOTA\b", "FOTA", palette::FOTA),
    (r"\bdevice\b", "DEVICE", palette::DEVICE),
    (r"\bsuccess\b", "SUCCESS", palette::SUCCESS),
    (r"\berror\b", "ERROR", palette::ERROR),
    (r"\bwarning\b", "WARNING", palette::WARNING),
    (r"\bfailed\b", "ERROR", palette::ERROR),
    (r"\bconnected\b", "SUCCESS", palette::SUCCESS),
    (r"\bdisconnected\b", "WARNING", palette::WARNING),
    (r"\breboot\b", "WARNING", palette::WARNING),
    (r"\bupgrade\b", "FOTA", palette::FOTA),
    (r"\bfirmware\b", "FOTA", palette::FOTA),
];

fn default_rules() -> &'static [DefaultRule] {
    static RULES: OnceLock<Vec<DefaultRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        DEFAULT_PATTERNS
            .iter()
            .filter_map(|&(pattern, tag, color)| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .ok()
                    .map(|regex| DefaultRule {
                        regex,
                        tag,
                        color,
                    })
            })
            .collect()
    })
}

#[derive(Debug)]
struct Match {
    start: usize,
    end: usize,
    style: KeywordStyle,
}

fn overlaps(accepted: &[Match], start: usize, end: usize) -> bool {
    accepted.iter().any(|m| start < m.end && m.start < end)
}

/// Splits messages into highlighted and plain segments.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    custom: Vec<CustomRule>,
}

impl Classifier {
    /// Builds a classifier from custom rules in keyword-file order.
    ///
    /// Rules are reordered longest keyword first; equal lengths keep file order.
    pub fn new(mut custom: Vec<CustomRule>) -> Self {
        custom.retain(|rule| !rule.keyword.is_empty());
        custom.sort_by_key(|rule| std::cmp::Reverse(rule.keyword.chars().count()));
        Self { custom }
    }

    /// Custom rules in scan order.
    pub fn custom_rules(&self) -> &[CustomRule] {
        &self.custom
    }

    /// Partitions `message` into segments covering it exactly once.
    pub fn classify(&self, message: &str) -> Vec<Segment> {
        if message.is_empty() {
            return Vec::new();
        }

        let mut accepted: Vec<Match> = Vec::new();
        for rule in &self.custom {
            for (start, found) in message.match_indices(rule.keyword.as_str()) {
                let end = start + found.len();
                if overlaps(&accepted, start, end) {
                    continue;
                }
                accepted.push(Match {
                    start,
                    end,
                    style: rule.style(),
                });
            }
        }

        for rule in default_rules() {
            for found in rule.regex.find_iter(message) {
                if found.start() == found.end() || overlaps(&accepted, found.start(), found.end()) {
                    continue;
                }
                accepted.push(Match {
                    start: found.start(),
                    end: found.end(),
                    style: KeywordStyle {
                        tag: rule.tag.to_string(),
                        color: rule.color,
                    },
                });
            }
        }

        accepted.sort_by_key(|m| m.start);

        let mut segments = Vec::with_capacity(accepted.len() * 2 + 1);
        let mut cursor = 0;
        for m in accepted {
            if m.start > cursor {
                segments.push(Segment::plain(&message[cursor..m.start]));
            }
            segments.push(Segment {
                text: message[m.start..m.end].to_string(),
                style: Some(m.style),
            });
            cursor = m.end;
        }
        if cursor < message.len() {
            segments.push(Segment::plain(&message[cursor..]));
        }
        segments
    }
}
