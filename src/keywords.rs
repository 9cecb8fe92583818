//! Loader for the `keywords.txt` highlight file.
//!
//! Each data line has the form `keyword=#RRGGBB`. Blank lines and lines starting
//! with `#` are ignored. Bad lines are rejected one by one and reported as
//! diagnostics; they never abort the rest of the file.

use std::path::{Path, PathBuf};

use ratatui::style::Color;
use thiserror::Error;

use crate::classify::CustomRule;

pub const KEYWORDS_FILENAME: &str = "keywords.txt";

/// Why a single keyword line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeywordLineError {
    #[error("line {line}: expected keyword=#RRGGBB, got '{text}'")]
    MissingSeparator { line: usize, text: String },
    #[error("line {line}: empty keyword")]
    EmptyKeyword { line: usize },
    #[error("line {line}: invalid color code '{color}' for keyword '{keyword}'")]
    InvalidColor {
        line: usize,
        keyword: String,
        color: String,
    },
}

/// Result of parsing a keyword file.
#[derive(Debug, Clone, Default)]
pub struct KeywordTable {
    /// Accepted rules in file order. A repeated keyword keeps its first position
    /// and takes the color of its last occurrence.
    pub rules: Vec<CustomRule>,
    pub rejected: Vec<KeywordLineError>,
}

/// Parses a `#RRGGBB` color. Anything but exactly six hex digits is refused.
pub fn parse_hex_color(raw: &str) -> Option<Color> {
    let hex = raw.strip_prefix('#')?;
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some(Color::Rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

/// Parses keyword file contents.
pub fn parse_keywords(text: &str) -> KeywordTable {
    let mut table = KeywordTable::default();
    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((keyword, color)) = line.split_once('=') else {
            table.rejected.push(KeywordLineError::MissingSeparator {
                line: line_no,
                text: line.to_string(),
            });
            continue;
        };
        let keyword = keyword.trim();
        let color = color.trim();
        if keyword.is_empty() {
            table
                .rejected
                .push(KeywordLineError::EmptyKeyword { line: line_no });
            continue;
        }
        let Some(parsed) = parse_hex_color(color) else {
            table.rejected.push(KeywordLineError::InvalidColor {
                line: line_no,
                keyword: keyword.to_string(),
                color: color.to_string(),
            });
            continue;
        };
        match table.rules.iter_mut().find(|rule| rule.keyword == keyword) {
            Some(existing) => existing.color = parsed,
            None => table.rules.push(CustomRule::new(keyword, parsed)),
        }
    }
    table
}

/// Picks the keyword file: the working directory first, then the resource dir.
pub fn resolve_keywords_path(resources: &Path) -> Option<PathBuf> {
    let local = PathBuf::from(KEYWORDS_FILENAME);
    if local.is_file() {
        return Some(local);
    }
    let bundled = resources.join(KEYWORDS_FILENAME);
    bundled.is_file().then_some(bundled)
}

/// Loads custom rules from `path`.
///
/// A missing file yields no rules. Read failures and rejected lines are
/// reported through `tracing` only.
pub fn load_keywords(path: Option<&Path>) -> Vec<CustomRule> {
    let Some(path) = path else {
        tracing::debug!("no keyword file found, using built-in highlighting only");
        return Vec::new();
    };
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("keyword file {} does not exist", path.display());
            return Vec::new();
        }
        Err(err) => {
            tracing::warn!("failed to read keyword file {}: {}", path.display(), err);
            return Vec::new();
        }
    };
    let table = parse_keywords(&text);
    for rejected in &table.rejected {
        tracing::warn!("{}: {}", path.display(), rejected);
    }
    tracing::info!(
        "loaded {} custom keywords from {}",
        table.rules.len(),
        path.display()
    );
    table.rules
}
