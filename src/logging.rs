//! Diagnostic logging using tracing.
//!
//! This is the tool's own diagnostic output, separate from the session
//! transcript. The level is controlled by the `MU310_LOG` environment variable.
//!
//! ```bash
//! MU310_LOG=debug mu310-tools
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_ENV: &str = "MU310_LOG";
pub const DIAGNOSTICS_FILENAME: &str = "diagnostics.log";

/// Where diagnostics are written.
#[derive(Debug, Clone)]
pub enum DiagnosticsTarget {
    /// Standard error, for headless subcommands.
    Stderr,
    /// `diagnostics.log` inside the given directory, for the TUI.
    File(PathBuf),
}

fn timer() -> fmt::time::ChronoLocal {
    fmt::time::ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the logging subsystem. Only the first call takes effect.
pub fn init(target: DiagnosticsTarget) -> Result<()> {
    match target {
        DiagnosticsTarget::Stderr => {
            let _ = tracing_subscriber::registry()
                .with(env_filter())
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false)
                        .with_timer(timer()),
                )
                .try_init();
        }
        DiagnosticsTarget::File(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(&dir, DIAGNOSTICS_FILENAME);
            let _ = tracing_subscriber::registry()
                .with(env_filter())
                .with(
                    fmt::layer()
                        .with_writer(appender)
                        .with_ansi(false)
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true)
                        .with_timer(timer()),
                )
                .try_init();
            tracing::info!("diagnostics written to {}", diagnostics_path(&dir).display());
        }
    }
    Ok(())
}

pub fn diagnostics_path(dir: &Path) -> PathBuf {
    dir.join(DIAGNOSTICS_FILENAME)
}
