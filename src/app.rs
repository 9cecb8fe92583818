//! Application state and UI logic.
//!
//! This module holds the core `App` struct: one log tab per vendor script, the
//! settings tab, the user's input buffers and the persisted settings. It also
//! defines how user input events are translated into application actions.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};

use crate::config::{normalize_title, AppConfig, MAX_FONT_SIZE, MAX_TITLE_CHARS, MIN_FONT_SIZE};
use crate::i18n::{t, Key, Lang};
use crate::output::{ViewBuffer, ViewUpdate};
use crate::process::{ScriptKind, ScriptStatus};

/// The tabs of the main window, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Adb,
    Fix,
    Upgrade,
    Settings,
}

impl Tab {
    pub const ALL: [Tab; 4] = [Tab::Adb, Tab::Fix, Tab::Upgrade, Tab::Settings];

    /// The script driven from this tab, if it is a log tab.
    pub fn script(self) -> Option<ScriptKind> {
        match self {
            Tab::Adb => Some(ScriptKind::AdbCheck),
            Tab::Fix => Some(ScriptKind::AutoFix),
            Tab::Upgrade => Some(ScriptKind::Burn),
            Tab::Settings => None,
        }
    }

    pub fn label(self, lang: Lang) -> &'static str {
        let key = match self {
            Tab::Adb => Key::TabAdb,
            Tab::Fix => Key::TabFix,
            Tab::Upgrade => Key::TabUpgrade,
            Tab::Settings => Key::TabSettings,
        };
        t(lang, key)
    }

    pub fn index(self) -> usize {
        Tab::ALL.iter().position(|tab| *tab == self).unwrap_or(0)
    }

    fn next(self) -> Self {
        Tab::ALL[(self.index() + 1) % Tab::ALL.len()]
    }

    fn prev(self) -> Self {
        Tab::ALL[(self.index() + Tab::ALL.len() - 1) % Tab::ALL.len()]
    }
}

/// Modes of user input interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Standard navigation mode.
    Normal,
    /// Typing a firmware path.
    Firmware,
    /// Editing one of the custom titles.
    Title(TitleField),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleField {
    En,
    Zh,
}

/// Log view and run state of one script tab.
#[derive(Debug, Clone)]
pub struct LogTab {
    pub kind: ScriptKind,
    pub buffer: ViewBuffer,
    /// Current scroll position in the log view.
    pub scroll: usize,
    /// Whether the log view is currently following new output.
    pub follow: bool,
    pub status: ScriptStatus,
    /// File name of the last launched script.
    pub current_file: Option<&'static str>,
}

impl LogTab {
    pub fn new(kind: ScriptKind, buffer: ViewBuffer) -> Self {
        Self {
            kind,
            buffer,
            scroll: 0,
            follow: true,
            status: ScriptStatus::Idle,
            current_file: None,
        }
    }
}

/// Actions resulting from user interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    /// No action required.
    None,
    /// Exit the application.
    Quit,
    /// Launch the script of a tab.
    Run(ScriptKind),
    /// Clear the view of one script.
    Clear(ScriptKind),
    /// Clear every view.
    ClearAll,
    /// Debug mode was switched to the given value.
    SetDebug(bool),
    /// Language, font size or window size changed and should be persisted.
    SettingsChanged,
    /// Titles were committed from the settings tab.
    SaveSettings,
    /// Reload `keywords.txt`.
    ReloadKeywords,
    /// A firmware path was entered.
    FirmwareSelected(PathBuf),
    /// List the serial ports into the ADB view.
    ScanPorts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone)]
struct StatusMessage {
    text: String,
    at: Instant,
    ttl: Duration,
    level: StatusLevel,
}

/// The main application state container.
#[derive(Debug)]
pub struct App {
    pub tabs: Vec<LogTab>,
    pub selected: Tab,
    /// Persisted settings, written back by the event loop.
    pub config: AppConfig,
    pub input_mode: InputMode,
    /// Buffer for the field being edited.
    pub input: String,
    pub firmware: Option<PathBuf>,
    /// Settings tab drafts, applied on save.
    pub title_en_draft: String,
    pub title_zh_draft: String,
    pub settings_focus: TitleField,
    pub debug: bool,
    /// Flag indicating if the application should exit.
    pub should_quit: bool,
    pub show_help: bool,
    /// Height of the log view area (for scrolling calculations).
    pub log_view_height: usize,
    status_message: Option<StatusMessage>,
}

impl App {
    /// Creates a new `App` instance.
    pub fn new(config: AppConfig, tabs: Vec<LogTab>, debug: bool) -> Self {
        let title_en_draft = config.title_en.clone();
        let title_zh_draft = config.title_zh.clone();
        Self {
            tabs,
            selected: Tab::Adb,
            config,
            input_mode: InputMode::Normal,
            input: String::new(),
            firmware: None,
            title_en_draft,
            title_zh_draft,
            settings_focus: TitleField::En,
            debug,
            should_quit: false,
            show_help: false,
            log_view_height: 0,
            status_message: None,
        }
    }

    pub fn lang(&self) -> Lang {
        self.config.lang
    }

    pub fn title(&self) -> String {
        self.config.app_title(self.config.lang)
    }

    pub fn tab(&self, kind: ScriptKind) -> Option<&LogTab> {
        self.tabs.iter().find(|tab| tab.kind == kind)
    }

    fn tab_mut(&mut self, kind: ScriptKind) -> Option<&mut LogTab> {
        self.tabs.iter_mut().find(|tab| tab.kind == kind)
    }

    pub fn selected_tab(&self) -> Option<&LogTab> {
        self.selected.script().and_then(|kind| self.tab(kind))
    }

    fn selected_tab_mut(&mut self) -> Option<&mut LogTab> {
        let kind = self.selected.script()?;
        self.tab_mut(kind)
    }

    /// Routes a sink update to the view registered under its channel.
    pub fn apply_view_update(&mut self, update: &ViewUpdate) {
        let view = self.log_view_height.max(1);
        for tab in &mut self.tabs {
            if tab.buffer.apply(update) {
                let max_scroll = tab.buffer.len().saturating_sub(view);
                if tab.follow {
                    tab.scroll = max_scroll;
                } else {
                    tab.scroll = tab.scroll.min(max_scroll);
                }
            }
        }
    }

    pub fn on_script_started(&mut self, kind: ScriptKind) {
        if let Some(tab) = self.tab_mut(kind) {
            tab.status = ScriptStatus::Running;
            tab.current_file = Some(kind.file_name());
        }
    }

    pub fn on_script_failed(&mut self, kind: ScriptKind) {
        if let Some(tab) = self.tab_mut(kind) {
            tab.status = ScriptStatus::Error;
            tab.current_file = None;
        }
    }

    pub fn on_script_finished(&mut self, kind: ScriptKind, code: i32) {
        if let Some(tab) = self.tab_mut(kind) {
            tab.status = ScriptStatus::Exited { code };
        }
    }

    /// Records the terminal size. Returns whether it changed.
    pub fn on_resize(&mut self, width: u16, height: u16) -> bool {
        let (width, height) = (u32::from(width), u32::from(height));
        if self.config.win_w == width && self.config.win_h == height {
            return false;
        }
        self.config.win_w = width;
        self.config.win_h = height;
        true
    }

    pub fn handle_mouse(&mut self, mouse: MouseEvent) -> AppAction {
        match mouse.kind {
            MouseEventKind::ScrollDown => self.scroll_down(3),
            MouseEventKind::ScrollUp => self.scroll_up(3),
            _ => {}
        }
        AppAction::None
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> AppAction {
        match self.input_mode {
            InputMode::Firmware => self.handle_firmware_input(key),
            InputMode::Title(field) => self.handle_title_input(key, field),
            InputMode::Normal => self.handle_normal_input(key),
        }
    }

    fn handle_firmware_input(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                self.input.clear();
                AppAction::None
            }
            KeyCode::Enter => {
                self.input_mode = InputMode::Normal;
                let raw = std::mem::take(&mut self.input);
                let path = raw.trim().trim_matches('"').trim();
                if path.is_empty() {
                    self.firmware = None;
                    return AppAction::None;
                }
                let path = PathBuf::from(path);
                self.firmware = Some(path.clone());
                AppAction::FirmwareSelected(path)
            }
            KeyCode::Backspace => {
                self.input.pop();
                AppAction::None
            }
            KeyCode::Char(c) => {
                self.input.push(c);
                AppAction::None
            }
            _ => AppAction::None,
        }
    }

    fn handle_title_input(&mut self, key: KeyEvent, field: TitleField) -> AppAction {
        match key.code {
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                self.input.clear();
            }
            KeyCode::Enter => {
                self.input_mode = InputMode::Normal;
                let draft = normalize_title(&std::mem::take(&mut self.input));
                match field {
                    TitleField::En => self.title_en_draft = draft,
                    TitleField::Zh => self.title_zh_draft = draft,
                }
            }
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) => {
                if self.input.chars().count() < MAX_TITLE_CHARS {
                    self.input.push(c);
                }
            }
            _ => {}
        }
        AppAction::None
    }

    fn handle_normal_input(&mut self, key: KeyEvent) -> AppAction {
        if self.show_help {
            match key.code {
                KeyCode::Char('?') | KeyCode::Esc | KeyCode::Enter => self.show_help = false,
                KeyCode::Char('q') => {
                    self.should_quit = true;
                    return AppAction::Quit;
                }
                _ => {}
            }
            return AppAction::None;
        }
        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                AppAction::Quit
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
                AppAction::Quit
            }
            KeyCode::Tab | KeyCode::Right => {
                self.select_tab(self.selected.next());
                AppAction::None
            }
            KeyCode::BackTab | KeyCode::Left => {
                self.select_tab(self.selected.prev());
                AppAction::None
            }
            KeyCode::Char(c @ '1'..='4') => {
                let index = c as usize - '1' as usize;
                self.select_tab(Tab::ALL[index]);
                AppAction::None
            }
            KeyCode::Enter | KeyCode::Char('r') if self.selected == Tab::Settings => {
                self.begin_title_edit();
                AppAction::None
            }
            KeyCode::Enter | KeyCode::Char('r') => self.request_run(),
            KeyCode::Char('c') => match self.selected.script() {
                Some(kind) => AppAction::Clear(kind),
                None => AppAction::None,
            },
            KeyCode::Char('C') => AppAction::ClearAll,
            KeyCode::Char('d') => {
                self.debug = !self.debug;
                AppAction::SetDebug(self.debug)
            }
            KeyCode::Char('l') => {
                self.config.lang = self.config.lang.toggle();
                AppAction::SettingsChanged
            }
            KeyCode::Char('+') | KeyCode::Char('=') => self.change_font(1),
            KeyCode::Char('-') => self.change_font(-1),
            KeyCode::Char('k') => AppAction::ReloadKeywords,
            KeyCode::Char('p') if self.selected == Tab::Adb => AppAction::ScanPorts,
            KeyCode::Char('f') if self.selected == Tab::Upgrade => {
                self.input = self
                    .firmware
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_default();
                self.input_mode = InputMode::Firmware;
                AppAction::None
            }
            KeyCode::Char('s') if self.selected == Tab::Settings => {
                self.config.title_en = normalize_title(&self.title_en_draft);
                self.config.title_zh = normalize_title(&self.title_zh_draft);
                self.set_status_message(t(self.lang(), Key::SettingsSaved));
                AppAction::SaveSettings
            }
            KeyCode::Char('?') => {
                self.show_help = true;
                AppAction::None
            }
            KeyCode::Up if self.selected == Tab::Settings => {
                self.settings_focus = TitleField::En;
                AppAction::None
            }
            KeyCode::Down if self.selected == Tab::Settings => {
                self.settings_focus = TitleField::Zh;
                AppAction::None
            }
            KeyCode::Up => {
                self.scroll_up(1);
                AppAction::None
            }
            KeyCode::Down => {
                self.scroll_down(1);
                AppAction::None
            }
            KeyCode::PageUp => {
                self.scroll_up(self.log_view_height.max(1));
                AppAction::None
            }
            KeyCode::PageDown => {
                self.scroll_down(self.log_view_height.max(1));
                AppAction::None
            }
            KeyCode::Home => {
                self.scroll_to_top();
                AppAction::None
            }
            KeyCode::End => {
                self.ensure_follow();
                if let Some(tab) = self.selected_tab_mut() {
                    tab.follow = true;
                }
                AppAction::None
            }
            _ => AppAction::None,
        }
    }

    fn select_tab(&mut self, tab: Tab) {
        self.selected = tab;
        let view = self.log_view_height;
        self.set_log_view_height(view);
    }

    fn request_run(&mut self) -> AppAction {
        let Some(tab) = self.selected_tab() else {
            return AppAction::None;
        };
        if tab.status.is_running() {
            let message = t(self.lang(), Key::AlreadyRunning);
            self.set_status_warning(message);
            return AppAction::None;
        }
        AppAction::Run(tab.kind)
    }

    fn begin_title_edit(&mut self) {
        self.input = match self.settings_focus {
            TitleField::En => self.title_en_draft.clone(),
            TitleField::Zh => self.title_zh_draft.clone(),
        };
        self.input_mode = InputMode::Title(self.settings_focus);
    }

    fn change_font(&mut self, delta: i16) -> AppAction {
        let next = (self.config.font_size as i16 + delta)
            .clamp(MIN_FONT_SIZE as i16, MAX_FONT_SIZE as i16) as u16;
        if next == self.config.font_size {
            return AppAction::None;
        }
        self.config.font_size = next;
        AppAction::SettingsChanged
    }

    pub fn scroll_up(&mut self, amount: usize) {
        let view = self.log_view_height.max(1);
        if let Some(tab) = self.selected_tab_mut() {
            let max_scroll = tab.buffer.len().saturating_sub(view);
            let current = if tab.follow { max_scroll } else { tab.scroll };
            tab.scroll = current.saturating_sub(amount).min(max_scroll);
            tab.follow = false;
        }
    }

    pub fn scroll_down(&mut self, amount: usize) {
        let view = self.log_view_height.max(1);
        if let Some(tab) = self.selected_tab_mut() {
            let max_scroll = tab.buffer.len().saturating_sub(view);
            let current = if tab.follow { max_scroll } else { tab.scroll };
            let next = (current + amount).min(max_scroll);
            tab.scroll = next;
            tab.follow = next == max_scroll;
        }
    }

    pub fn scroll_to_top(&mut self) {
        if let Some(tab) = self.selected_tab_mut() {
            tab.scroll = 0;
            tab.follow = false;
        }
    }

    pub fn ensure_follow(&mut self) {
        let view = self.log_view_height.max(1);
        if let Some(tab) = self.selected_tab_mut() {
            tab.scroll = tab.buffer.len().saturating_sub(view);
        }
    }

    pub fn set_log_view_height(&mut self, height: usize) {
        self.log_view_height = height;
        let view = height.max(1);
        if let Some(tab) = self.selected_tab_mut() {
            let max_scroll = tab.buffer.len().saturating_sub(view);
            if tab.follow {
                tab.scroll = max_scroll;
            } else {
                tab.scroll = tab.scroll.min(max_scroll);
            }
        }
    }

    pub fn status_line(&self) -> String {
        let lang = self.lang();
        let debug = if self.debug { Key::On } else { Key::Off };
        let Some(tab) = self.selected_tab() else {
            return format!(
                "{} {} | {} {}",
                t(lang, Key::DebugMode),
                t(lang, debug),
                t(lang, Key::HeaderFont),
                self.config.font_size
            );
        };
        format!(
            "{} {} | {} {} | {} {} | {} {}",
            t(lang, Key::Status),
            tab.status.describe(lang),
            t(lang, Key::Current),
            tab.current_file.unwrap_or(t(lang, Key::None)),
            t(lang, Key::DebugMode),
            t(lang, debug),
            t(lang, Key::HeaderFont),
            self.config.font_size
        )
    }

    pub fn status_message(&self) -> Option<(&str, StatusLevel)> {
        let message = self.status_message.as_ref()?;
        (message.at.elapsed() < message.ttl).then_some((message.text.as_str(), message.level))
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.set_status(message, StatusLevel::Info);
    }

    pub fn set_status_warning(&mut self, message: impl Into<String>) {
        self.set_status(message, StatusLevel::Warning);
    }

    fn set_status(&mut self, message: impl Into<String>, level: StatusLevel) {
        self.status_message = Some(StatusMessage {
            text: message.into(),
            at: Instant::now(),
            ttl: Duration::from_secs(3),
            level,
        });
    }
}
