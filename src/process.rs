//! The vendor scripts this tool launches and the per-tab run status.
//!
//! Three batch files ship next to the binary. Each one has a fixed log channel
//! and a translated action label that is logged before it starts.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::i18n::{t, Key, Lang};
use crate::runner::{OnComplete, ProcessRunner};
use crate::sink::LogChannel;

/// One of the bundled vendor scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum ScriptKind {
    /// ADB environment check.
    #[value(name = "adb")]
    AdbCheck,
    /// ADB connection auto fix.
    #[value(name = "fix")]
    AutoFix,
    /// Firmware burn. Needs a firmware image.
    #[value(name = "upgrade")]
    Burn,
}

impl ScriptKind {
    pub const ALL: [ScriptKind; 3] = [ScriptKind::AdbCheck, ScriptKind::AutoFix, ScriptKind::Burn];

    pub fn file_name(self) -> &'static str {
        match self {
            ScriptKind::AdbCheck => "ADB Environment Check.bat",
            ScriptKind::AutoFix => "auto_fix_adb_ENG.bat",
            ScriptKind::Burn => "Burn_in _611GT.bat",
        }
    }

    /// Name of the log view the script writes to.
    pub fn channel(self) -> &'static str {
        match self {
            ScriptKind::AdbCheck => "adb",
            ScriptKind::AutoFix => "fix",
            ScriptKind::Burn => "upgrade",
        }
    }

    pub fn label(self) -> Key {
        match self {
            ScriptKind::AdbCheck => Key::CheckAdbEnv,
            ScriptKind::AutoFix => Key::RunAutoFix,
            ScriptKind::Burn => Key::RunUpgrade,
        }
    }

    pub fn needs_firmware(self) -> bool {
        matches!(self, ScriptKind::Burn)
    }
}

/// Run status shown on a script tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptStatus {
    #[default]
    Idle,
    Running,
    Exited {
        code: i32,
    },
    /// The script could not be started.
    Error,
}

impl ScriptStatus {
    pub fn is_running(self) -> bool {
        matches!(self, ScriptStatus::Running)
    }

    pub fn describe(self, lang: Lang) -> String {
        match self {
            ScriptStatus::Idle => t(lang, Key::Idle).to_string(),
            ScriptStatus::Running => t(lang, Key::Running).to_string(),
            ScriptStatus::Exited { code } => format!("{} ({})", t(lang, Key::Exited), code),
            ScriptStatus::Error => t(lang, Key::Error).to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("{file} not found")]
    NotFound { file: &'static str },
    #[error("Please select firmware (*.bin) first")]
    NoFirmware,
    #[error("Firmware file not found: {path}")]
    FirmwareMissing { path: String },
}

/// A validated script invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub kind: ScriptKind,
    pub script: PathBuf,
    pub args: Vec<String>,
    /// The script's own directory.
    pub cwd: PathBuf,
}

/// Resolves bundled scripts under a resource directory.
#[derive(Debug, Clone)]
pub struct ScriptCatalog {
    resources: PathBuf,
}

impl ScriptCatalog {
    pub fn new(resources: impl Into<PathBuf>) -> Self {
        Self {
            resources: resources.into(),
        }
    }

    pub fn resources(&self) -> &Path {
        &self.resources
    }

    pub fn locate(&self, kind: ScriptKind) -> Result<PathBuf, ScriptError> {
        let path = self.resources.join(kind.file_name());
        if path.is_file() {
            Ok(path)
        } else {
            Err(ScriptError::NotFound {
                file: kind.file_name(),
            })
        }
    }

    /// Checks everything a launch needs. The firmware is validated before the
    /// script, and is passed to the script as an absolute path.
    pub fn plan(
        &self,
        kind: ScriptKind,
        firmware: Option<&Path>,
        extra_args: &[String],
    ) -> Result<LaunchPlan, ScriptError> {
        let mut args = Vec::new();
        if kind.needs_firmware() {
            let firmware = firmware
                .filter(|path| !path.as_os_str().is_empty())
                .ok_or(ScriptError::NoFirmware)?;
            if !firmware.is_file() {
                return Err(ScriptError::FirmwareMissing {
                    path: firmware.display().to_string(),
                });
            }
            let absolute =
                std::path::absolute(firmware).unwrap_or_else(|_| firmware.to_path_buf());
            args.push(absolute.display().to_string());
        }
        args.extend(extra_args.iter().cloned());

        let script = self.locate(kind)?;
        let cwd = script
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.resources.clone());
        Ok(LaunchPlan {
            kind,
            script,
            args,
            cwd,
        })
    }

    /// Validates and starts `kind`, logging to its channel.
    ///
    /// On a validation error the error is logged, `on_complete` is dropped
    /// without being called and the error is returned.
    pub fn launch(
        &self,
        runner: &ProcessRunner,
        kind: ScriptKind,
        firmware: Option<&Path>,
        extra_args: &[String],
        lang: Lang,
        on_complete: Option<OnComplete>,
    ) -> Result<LaunchPlan, ScriptError> {
        let sink = runner.sink();
        let channel = LogChannel::named(kind.channel());
        if !kind.needs_firmware() {
            sink.info(&channel, &format!("{}...", t(lang, kind.label())));
        }
        let plan = match self.plan(kind, firmware, extra_args) {
            Ok(plan) => plan,
            Err(err) => {
                sink.error(&channel, &err.to_string());
                return Err(err);
            }
        };
        if let Some(firmware) = plan.args.first().filter(|_| kind.needs_firmware()) {
            sink.info(&channel, &format!("{} : {}", t(lang, kind.label()), firmware));
        }
        tracing::info!("launching {}", plan.script.display());
        runner.run_bat_file(
            &plan.script,
            &plan.args,
            channel,
            Some(plan.cwd.clone()),
            on_complete,
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifier;
    use crate::output::ViewUpdate;
    use crate::sink::{LogLevel, LogSink, Transcript};

    fn catalog_with(files: &[&str]) -> (tempfile::TempDir, ScriptCatalog) {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            std::fs::write(dir.path().join(file), "echo ok\n").unwrap();
        }
        let catalog = ScriptCatalog::new(dir.path());
        (dir, catalog)
    }

    #[test]
    fn each_script_has_its_own_channel() {
        let channels: Vec<_> = ScriptKind::ALL.iter().map(|k| k.channel()).collect();
        assert_eq!(channels, vec!["adb", "fix", "upgrade"]);
    }

    #[test]
    fn missing_script_is_reported_by_file_name() {
        let (_dir, catalog) = catalog_with(&[]);
        let err = catalog.plan(ScriptKind::AutoFix, None, &[]).unwrap_err();
        assert_eq!(err.to_string(), "auto_fix_adb_ENG.bat not found");
    }

    #[test]
    fn upgrade_requires_an_existing_firmware() {
        let (dir, catalog) = catalog_with(&["Burn_in _611GT.bat"]);
        assert_eq!(
            catalog.plan(ScriptKind::Burn, None, &[]),
            Err(ScriptError::NoFirmware)
        );
        assert_eq!(
            catalog.plan(ScriptKind::Burn, Some(Path::new("")), &[]),
            Err(ScriptError::NoFirmware)
        );
        let missing = dir.path().join("nope.bin");
        let err = catalog.plan(ScriptKind::Burn, Some(&missing), &[]).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Firmware file not found: {}", missing.display())
        );
    }

    #[test]
    fn firmware_is_checked_before_the_script() {
        let (dir, catalog) = catalog_with(&[]);
        let firmware = dir.path().join("fw.bin");
        std::fs::write(&firmware, b"\x00").unwrap();
        assert_eq!(
            catalog.plan(ScriptKind::Burn, None, &[]),
            Err(ScriptError::NoFirmware)
        );
        assert_eq!(
            catalog.plan(ScriptKind::Burn, Some(&firmware), &[]),
            Err(ScriptError::NotFound {
                file: "Burn_in _611GT.bat"
            })
        );
    }

    #[test]
    fn plan_passes_firmware_first_and_runs_in_script_dir() {
        let (dir, catalog) = catalog_with(&["Burn_in _611GT.bat"]);
        let firmware = dir.path().join("fw.bin");
        std::fs::write(&firmware, b"\x00").unwrap();
        let plan = catalog
            .plan(ScriptKind::Burn, Some(&firmware), &["--fast".into()])
            .unwrap();
        assert_eq!(plan.cwd, dir.path());
        assert_eq!(plan.args.len(), 2);
        assert!(Path::new(&plan.args[0]).is_absolute());
        assert_eq!(plan.args[1], "--fast");
    }

    #[test]
    fn status_labels_follow_language() {
        assert_eq!(ScriptStatus::Exited { code: 3 }.describe(Lang::En), "Exited (3)");
        assert_eq!(ScriptStatus::Running.describe(Lang::Zh), "執行中");
        assert!(!ScriptStatus::Idle.is_running());
    }

    #[tokio::test]
    async fn failed_launch_logs_label_then_error() {
        let (_dir, catalog) = catalog_with(&[]);
        let (sink, mut rx) = LogSink::new(Transcript::disabled(), Classifier::default());
        sink.register_buffer("adb");
        let runner = ProcessRunner::new(sink);
        let result = catalog.launch(&runner, ScriptKind::AdbCheck, None, &[], Lang::En, None);
        assert!(result.is_err());

        let mut lines = Vec::new();
        while let Ok(ViewUpdate::Append { line, .. }) = rx.try_recv() {
            lines.push((line.level, line.message()));
        }
        assert_eq!(
            lines,
            vec![
                (LogLevel::Info, "Check ADB Environment...".to_string()),
                (LogLevel::Error, "ADB Environment Check.bat not found".to_string()),
            ]
        );
    }
}
