//! English / Traditional Chinese label tables.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Lang {
    En,
    /// Used for every config value other than `"EN"`.
    #[default]
    Zh,
}

impl Lang {
    /// Parses a config value. Only `"EN"` (any case) selects English.
    pub fn from_code(code: &str) -> Self {
        if code.trim().eq_ignore_ascii_case("EN") {
            Lang::En
        } else {
            Lang::Zh
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Lang::En => "EN",
            Lang::Zh => "ZH",
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            Lang::En => Lang::Zh,
            Lang::Zh => Lang::En,
        }
    }
}

impl From<String> for Lang {
    fn from(code: String) -> Self {
        Lang::from_code(&code)
    }
}

impl From<Lang> for String {
    fn from(lang: Lang) -> Self {
        lang.code().to_string()
    }
}

/// Translatable UI strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    AppTitle,
    HeaderFont,
    HeaderLang,
    Idle,
    Running,
    Exited,
    Error,
    None,
    Current,
    Status,
    Version,
    TabAdb,
    TabFix,
    TabUpgrade,
    TabSettings,
    CheckAdbEnv,
    RunAutoFix,
    RunUpgrade,
    FirmwareFile,
    SelectFirmware,
    SettingsTitle,
    TitleEn,
    TitleZh,
    SaveSettings,
    SettingsSaved,
    DebugMode,
    On,
    Off,
    AlreadyRunning,
    KeywordsReloaded,
    LogsCleared,
    HelpTitle,
    HelpText,
    Hints,
}

/// Looks up the label for `key` in `lang`.
pub fn t(lang: Lang, key: Key) -> &'static str {
    match lang {
        Lang::En => en(key),
        Lang::Zh => zh(key),
    }
}

fn en(key: Key) -> &'static str {
    match key {
        Key::AppTitle => "MU310 Tools Center",
        Key::HeaderFont => "Font",
        Key::HeaderLang => "Language",
        Key::Idle => "Idle",
        Key::Running => "Running",
        Key::Exited => "Exited",
        Key::Error => "Error",
        Key::None => "None",
        Key::Current => "Current:",
        Key::Status => "Status:",
        Key::Version => "Version:",
        Key::TabAdb => "ADB Tools",
        Key::TabFix => "Connection Fix",
        Key::TabUpgrade => "Firmware Upgrade",
        Key::TabSettings => "Settings",
        Key::CheckAdbEnv => "Check ADB Environment",
        Key::RunAutoFix => "Run Auto Fix",
        Key::RunUpgrade => "Run Upgrade",
        Key::FirmwareFile => "Firmware file:",
        Key::SelectFirmware => "Select firmware file",
        Key::SettingsTitle => "Settings (custom title, apply immediately)",
        Key::TitleEn => "Title (EN)",
        Key::TitleZh => "Title (ZH)",
        Key::SaveSettings => "Save Settings",
        Key::SettingsSaved => "Settings saved and applied",
        Key::DebugMode => "Debug Mode",
        Key::On => "on",
        Key::Off => "off",
        Key::AlreadyRunning => "A script is already running on this tab",
        Key::KeywordsReloaded => "Keyword colors reloaded",
        Key::LogsCleared => "Logs cleared",
        Key::HelpTitle => "Usage Guide",
        Key::HelpText => concat!(
            "1) ADB Tools: check the ADB environment, or list COM ports (p).\n",
            "2) Connection Fix: run Auto Fix to set usbcfg and reboot, then recheck ADB.\n",
            "3) Firmware Upgrade: select a firmware file (f), then start the upgrade.\n",
            "Notes: enable Debug Mode (d) for detailed logs. Logs auto-save in the logs/ folder."
        ),
        Key::Hints => {
            "Enter run | p COM ports | f firmware | c clear | d debug | l lang | +/- font | k keywords | ? help | q quit"
        }
    }
}

fn zh(key: Key) -> &'static str {
    match key {
        Key::AppTitle => "MU310 工具中心",
        Key::HeaderFont => "字體",
        Key::HeaderLang => "語言",
        Key::Idle => "待機中",
        Key::Running => "執行中",
        Key::Exited => "已結束",
        Key::Error => "錯誤",
        Key::None => "無",
        Key::Current => "執行檔案:",
        Key::Status => "狀態:",
        Key::Version => "版本:",
        Key::TabAdb => "ADB 工具",
        Key::TabFix => "連線修復",
        Key::TabUpgrade => "韌體升級",
        Key::TabSettings => "設定",
        Key::CheckAdbEnv => "檢查 ADB 環境",
        Key::RunAutoFix => "執行自動修復",
        Key::RunUpgrade => "執行韌體升級",
        Key::FirmwareFile => "韌體檔案:",
        Key::SelectFirmware => "選擇韌體檔案",
        Key::SettingsTitle => "設定（可自訂標題，立即生效）",
        Key::TitleEn => "英文標題",
        Key::TitleZh => "中文標題",
        Key::SaveSettings => "儲存設定",
        Key::SettingsSaved => "設定已儲存並立即生效",
        Key::DebugMode => "除錯模式",
        Key::On => "開",
        Key::Off => "關",
        Key::AlreadyRunning => "此分頁的腳本仍在執行中",
        Key::KeywordsReloaded => "關鍵字顏色已重新載入",
        Key::LogsCleared => "日誌已清除",
        Key::HelpTitle => "使用說明",
        Key::HelpText => concat!(
            "1) ADB 工具: 檢查 ADB 環境，或列出 COM 埠 (p)。\n",
            "2) 連線修復: 執行 Auto Fix 設定 usbcfg 並重啟，之後檢查 ADB。\n",
            "3) 韌體升級: 選擇韌體檔案 (f)，然後開始升級。\n",
            "備註: 開啟除錯模式 (d) 可顯示詳細日誌。日誌會自動存到 logs/ 資料夾。"
        ),
        Key::Hints => {
            "Enter 執行 | p COM 埠 | f 韌體 | c 清除 | d 除錯 | l 語言 | +/- 字體 | k 關鍵字 | ? 說明 | q 離開"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_en_selects_english() {
        assert_eq!(Lang::from_code("EN"), Lang::En);
        assert_eq!(Lang::from_code("en"), Lang::En);
        assert_eq!(Lang::from_code("ZH"), Lang::Zh);
        assert_eq!(Lang::from_code("FR"), Lang::Zh);
        assert_eq!(Lang::from_code(""), Lang::Zh);
    }

    #[test]
    fn serializes_as_language_code() {
        assert_eq!(serde_json::to_string(&Lang::En).unwrap(), r#""EN""#);
        assert_eq!(serde_json::from_str::<Lang>(r#""en""#).unwrap(), Lang::En);
        assert_eq!(serde_json::from_str::<Lang>(r#""JP""#).unwrap(), Lang::Zh);
    }

    #[test]
    fn toggle_round_trips() {
        assert_eq!(Lang::En.toggle(), Lang::Zh);
        assert_eq!(Lang::Zh.toggle().toggle(), Lang::Zh);
    }

    #[test]
    fn translates_app_title() {
        assert_eq!(t(Lang::En, Key::AppTitle), "MU310 Tools Center");
        assert_eq!(t(Lang::Zh, Key::AppTitle), "MU310 工具中心");
    }
}
