//! Persistent UI settings.
//!
//! Settings live in a flat `config.json` object. Keys this tool does not know
//! about are carried through a load/save cycle untouched.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::i18n::{t, Key, Lang};

pub const CONFIG_FILENAME: &str = "config.json";

pub const DEFAULT_WIN_W: u32 = 900;
pub const DEFAULT_WIN_H: u32 = 600;
pub const DEFAULT_FONT_SIZE: u16 = 12;
pub const MIN_FONT_SIZE: u16 = 8;
pub const MAX_FONT_SIZE: u16 = 24;
/// Longest custom title accepted, in characters.
pub const MAX_TITLE_CHARS: usize = 30;

/// Contents of `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppConfig {
    pub lang: Lang,
    pub win_w: u32,
    pub win_h: u32,
    pub font_size: u16,
    pub title_en: String,
    pub title_zh: String,
    /// Unknown keys, preserved on save.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            lang: Lang::default(),
            win_w: DEFAULT_WIN_W,
            win_h: DEFAULT_WIN_H,
            font_size: DEFAULT_FONT_SIZE,
            title_en: String::new(),
            title_zh: String::new(),
            extra: Map::new(),
        }
    }
}

impl AppConfig {
    /// Builds a config from a parsed JSON object.
    ///
    /// Each known key is read on its own: a missing or unusable value falls
    /// back to its default without affecting the others. Numbers may also be
    /// given as numeric strings. Everything else is kept in `extra`.
    pub fn from_map(mut map: Map<String, Value>) -> Self {
        let mut config = AppConfig::default();
        if let Some(value) = map.remove("lang") {
            config.lang = value.as_str().map(Lang::from_code).unwrap_or_default();
        }
        if let Some(value) = map.remove("win_w") {
            config.win_w = read_dimension(&value).unwrap_or(DEFAULT_WIN_W);
        }
        if let Some(value) = map.remove("win_h") {
            config.win_h = read_dimension(&value).unwrap_or(DEFAULT_WIN_H);
        }
        if let Some(value) = map.remove("font_size") {
            config.font_size = read_int(&value)
                .map(|size| size.clamp(MIN_FONT_SIZE as i64, MAX_FONT_SIZE as i64) as u16)
                .unwrap_or(DEFAULT_FONT_SIZE);
        }
        if let Some(value) = map.remove("title_en") {
            config.title_en = value.as_str().unwrap_or_default().to_string();
        }
        if let Some(value) = map.remove("title_zh") {
            config.title_zh = value.as_str().unwrap_or_default().to_string();
        }
        config.extra = map;
        config.normalize();
        config
    }

    /// Clamps the font size and trims titles to their allowed length.
    pub fn normalize(&mut self) {
        self.font_size = self.font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
        self.title_en = normalize_title(&self.title_en);
        self.title_zh = normalize_title(&self.title_zh);
    }

    /// The header title for `lang`: the custom title if set, else the default.
    pub fn app_title(&self, lang: Lang) -> String {
        let custom = match lang {
            Lang::En => self.title_en.trim(),
            Lang::Zh => self.title_zh.trim(),
        };
        if custom.is_empty() {
            t(lang, Key::AppTitle).to_string()
        } else {
            custom.to_string()
        }
    }
}

fn read_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn read_dimension(value: &Value) -> Option<u32> {
    read_int(value)
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n > 0)
}

pub fn normalize_title(raw: &str) -> String {
    raw.trim().chars().take(MAX_TITLE_CHARS).collect()
}

/// Loads and parses the configuration from a file path.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    match value {
        Value::Object(map) => Ok(AppConfig::from_map(map)),
        _ => anyhow::bail!("config file {} is not a JSON object", path.display()),
    }
}

/// A config file together with its in-memory contents.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    pub data: AppConfig,
}

impl ConfigStore {
    /// Loads `path`, falling back to defaults when it is missing or invalid.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = if path.exists() {
            match load_config(&path) {
                Ok(data) => data,
                Err(err) => {
                    tracing::warn!("{:#}; using default settings", err);
                    AppConfig::default()
                }
            }
        } else {
            tracing::debug!("no config at {}, using defaults", path.display());
            AppConfig::default()
        };
        Self { path, data }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self) -> Result<()> {
        let json =
            serde_json::to_string_pretty(&self.data).context("failed to serialize settings")?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(&self.path, json)
            .with_context(|| format!("failed to write config file {}", self.path.display()))
    }

    /// Writes the settings back. Failures are logged and otherwise ignored.
    pub fn save(&self) -> bool {
        match self.write() {
            Ok(()) => {
                tracing::debug!("saved settings to {}", self.path.display());
                true
            }
            Err(err) => {
                tracing::warn!("{:#}", err);
                false
            }
        }
    }
}
