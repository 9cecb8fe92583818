//! MU310 Tools: a launcher for the MU310 vendor maintenance scripts.
//!
//! This is the entry point of the application. It parses command-line arguments,
//! loads settings and keyword colors, and either runs the interactive TUI or one
//! of the headless subcommands.

mod app;
mod classify;
mod config;
mod events;
mod i18n;
mod keywords;
mod logging;
mod output;
mod ports;
mod process;
mod runner;
mod sink;
mod tui;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::builder::styling::{AnsiColor, Effects, Style};
use clap::builder::Styles;
use clap::{Parser, Subcommand};
use crossterm::style::Stylize;
use ratatui::style::Color;
use tokio::sync::{mpsc, oneshot};

use crate::app::{App, AppAction, LogTab};
use crate::classify::Classifier;
use crate::config::{ConfigStore, CONFIG_FILENAME};
use crate::events::Event;
use crate::i18n::{t, Key};
use crate::keywords::{load_keywords, parse_keywords, resolve_keywords_path};
use crate::logging::DiagnosticsTarget;
use crate::output::{render_ansi, ViewUpdate, DEFAULT_MAX_LINES};
use crate::process::{ScriptCatalog, ScriptKind};
use crate::runner::{OnComplete, ProcessRunner};
use crate::sink::{LogChannel, LogSink, Transcript};

/// Settings are written this long after the last terminal resize.
const SAVE_DEBOUNCE: Duration = Duration::from_millis(500);

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "mu310-tools",
    version,
    about = "MU310 maintenance script launcher",
    styles = help_styles(),
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Directory holding the bundled .bat scripts.
    #[arg(long, global = true, default_value = ".")]
    resources: PathBuf,
    /// Settings file (default: <resources>/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Keyword color file (default: ./keywords.txt, then <resources>/keywords.txt).
    #[arg(long, global = true)]
    keywords: Option<PathBuf>,
    /// Directory for session transcripts and diagnostics.
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,
    /// Max log lines kept per view.
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_LINES)]
    max_lines: usize,
    /// Start with debug mode on.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show version information.
    Version,
    /// Run one script without the TUI and exit with its exit code.
    Run {
        #[arg(value_enum)]
        script: ScriptKind,
        /// Firmware image for the upgrade script.
        #[arg(long)]
        firmware: Option<PathBuf>,
        /// Extra arguments passed to the script.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Validate a keyword color file.
    Keywords { path: Option<PathBuf> },
    /// List the serial (COM) ports.
    Ports,
}

impl Cli {
    fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| self.resources.join(CONFIG_FILENAME))
    }

    fn keywords_path(&self) -> Option<PathBuf> {
        match &self.keywords {
            Some(path) => Some(path.clone()),
            None => resolve_keywords_path(&self.resources),
        }
    }
}

fn version_string() -> String {
    format!(
        "{}-{}",
        env!("CARGO_PKG_VERSION"),
        option_env!("MU310_BUILD").unwrap_or("dev")
    )
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    match &cli.command {
        Some(Commands::Version) => {
            println!("mu310-tools {}", version_string());
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Keywords { path }) => {
            logging::init(DiagnosticsTarget::Stderr)?;
            check_keywords(path.clone().or_else(|| cli.keywords_path()))
        }
        Some(Commands::Ports) => {
            logging::init(DiagnosticsTarget::Stderr)?;
            list_ports_headless(&cli);
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Run {
            script,
            firmware,
            args,
        }) => {
            logging::init(DiagnosticsTarget::Stderr)?;
            let code = run_headless(&cli, *script, firmware.as_deref(), args).await?;
            Ok(ExitCode::from(exit_status(code)))
        }
        None => {
            run_tui(&cli).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Maps a child exit code to the process exit status. Codes outside 0..=255
/// (including -1 for start failures) become 1.
fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

fn build_sink(cli: &Cli, keywords: Option<&Path>) -> (LogSink, mpsc::UnboundedReceiver<ViewUpdate>) {
    let classifier = Classifier::new(load_keywords(keywords));
    tracing::debug!("{} custom keyword rules", classifier.custom_rules().len());
    let transcript = Transcript::open_session(&cli.log_dir);
    let (sink, view_rx) = LogSink::with_max_lines(transcript, classifier, cli.max_lines);
    sink.set_debug_enabled(cli.debug);
    (sink, view_rx)
}

async fn run_headless(
    cli: &Cli,
    script: ScriptKind,
    firmware: Option<&Path>,
    args: &[String],
) -> Result<i32> {
    let store = ConfigStore::load(cli.config_path());
    let keywords = cli.keywords_path();
    let (sink, mut view_rx) = build_sink(cli, keywords.as_deref());
    sink.register_buffer(script.channel());
    let runner = ProcessRunner::new(sink.clone());
    let catalog = ScriptCatalog::new(&cli.resources);

    let (done_tx, mut done_rx) = oneshot::channel();
    let on_complete: OnComplete = Box::new(move |code| {
        let _ = done_tx.send(code);
    });
    let launched = catalog.launch(
        &runner,
        script,
        firmware,
        args,
        store.data.lang,
        Some(on_complete),
    );

    let code = match launched {
        Ok(_) => loop {
            tokio::select! {
                biased;
                Some(update) = view_rx.recv() => print_update(&update),
                code = &mut done_rx => break code.unwrap_or(crate::runner::SPAWN_FAILED),
            }
        },
        Err(_) => 1,
    };
    while let Ok(update) = view_rx.try_recv() {
        print_update(&update);
    }
    if let Some(path) = sink.transcript_path() {
        tracing::info!("transcript saved to {}", path.display());
    }
    Ok(code)
}

fn list_ports_headless(cli: &Cli) {
    let (sink, mut view_rx) = build_sink(cli, None);
    sink.register_buffer(ScriptKind::AdbCheck.channel());
    ports::scan_ports(&sink);
    while let Ok(update) = view_rx.try_recv() {
        print_update(&update);
    }
}

fn print_update(update: &ViewUpdate) {
    if let ViewUpdate::Append { line, .. } = update {
        println!("{}", render_ansi(line));
    }
}

fn check_keywords(path: Option<PathBuf>) -> Result<ExitCode> {
    let Some(path) = path else {
        anyhow::bail!("no keywords.txt found (pass a path or --keywords)");
    };
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read keyword file {}", path.display()))?;
    let table = parse_keywords(&text);
    for rule in &table.rules {
        let hex = match rule.color {
            Color::Rgb(r, g, b) => format!("#{:02X}{:02X}{:02X}", r, g, b),
            _ => String::new(),
        };
        let sample = match rule.color {
            Color::Rgb(r, g, b) => rule
                .keyword
                .as_str()
                .with(crossterm::style::Color::Rgb { r, g, b })
                .to_string(),
            _ => rule.keyword.clone(),
        };
        println!("{}={}  {}", rule.keyword, hex, sample);
    }
    for rejected in &table.rejected {
        println!("{}", format!("rejected: {}", rejected).red());
    }
    println!(
        "{} accepted, {} rejected ({})",
        table.rules.len(),
        table.rejected.len(),
        path.display()
    );
    Ok(if table.rejected.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

/// Everything an `AppAction` may need to touch.
struct Services {
    sink: LogSink,
    runner: ProcessRunner,
    catalog: ScriptCatalog,
    /// `--keywords`, if given. Otherwise the file is looked up again on reload.
    keywords_override: Option<PathBuf>,
    event_tx: mpsc::Sender<Event>,
}

impl Services {
    fn keywords_path(&self) -> Option<PathBuf> {
        self.keywords_override
            .clone()
            .or_else(|| resolve_keywords_path(self.catalog.resources()))
    }
}

async fn run_tui(cli: &Cli) -> Result<()> {
    logging::init(DiagnosticsTarget::File(cli.log_dir.clone()))?;
    tracing::info!("mu310-tools {} starting", version_string());

    let mut store = ConfigStore::load(cli.config_path());
    tracing::info!("settings file {}", store.path().display());
    let keywords = cli.keywords_path();
    let (sink, mut view_rx) = build_sink(cli, keywords.as_deref());
    let tabs = ScriptKind::ALL
        .iter()
        .map(|kind| LogTab::new(*kind, sink.register_buffer(kind.channel())))
        .collect();
    tracing::debug!("views registered: {:?}", sink.channels());
    let mut app = App::new(store.data.clone(), tabs, cli.debug);

    let (event_tx, mut event_rx) = mpsc::channel(256);
    let services = Services {
        runner: ProcessRunner::new(sink.clone()),
        sink,
        catalog: ScriptCatalog::new(&cli.resources),
        keywords_override: cli.keywords.clone(),
        event_tx: event_tx.clone(),
    };
    if let Some(path) = services.sink.transcript_path() {
        services.sink.info(
            &LogChannel::Broadcast,
            &format!("Log is continuously saved to: {}", path.display()),
        );
    }

    let mut terminal = tui::init_terminal().context("failed to initialize terminal")?;
    spawn_input_listener(event_tx);

    let mut ticker = tokio::time::interval(Duration::from_millis(150));
    let mut save_due: Option<Instant> = None;
    let mut result = Ok(());

    loop {
        tokio::select! {
            Some(update) = view_rx.recv() => {
                app.apply_view_update(&update);
                while let Ok(update) = view_rx.try_recv() {
                    app.apply_view_update(&update);
                }
            }
            Some(event) = event_rx.recv() => {
                match event {
                    Event::Key(key) => {
                        let action = app.handle_key(key);
                        handle_app_action(action, &mut app, &services, &mut store);
                    }
                    Event::Mouse(mouse) => {
                        let action = app.handle_mouse(mouse);
                        handle_app_action(action, &mut app, &services, &mut store);
                    }
                    Event::Resize { width, height } => {
                        if app.on_resize(width, height) {
                            save_due = Some(Instant::now() + SAVE_DEBOUNCE);
                        }
                        let _ = terminal.autoresize();
                    }
                    Event::ScriptFinished { kind, code } => {
                        tracing::info!("{} finished with code {}", kind.file_name(), code);
                        app.on_script_finished(kind, code);
                    }
                }
            }
            _ = ticker.tick() => {
                if save_due.is_some_and(|due| Instant::now() >= due) {
                    save_due = None;
                    persist(&mut store, &app);
                }
            }
        }

        if let Err(err) = tui::draw(&mut app, &mut terminal) {
            result = Err(err.into());
            break;
        }
        if app.should_quit {
            break;
        }
    }

    persist(&mut store, &app);
    tui::restore_terminal(terminal)?;
    result
}

fn persist(store: &mut ConfigStore, app: &App) {
    store.data = app.config.clone();
    store.save();
}

fn handle_app_action(action: AppAction, app: &mut App, services: &Services, store: &mut ConfigStore) {
    let sink = &services.sink;
    match action {
        AppAction::Run(kind) => {
            let tx = services.event_tx.clone();
            let on_complete: OnComplete = Box::new(move |code| {
                tokio::spawn(async move {
                    let _ = tx.send(Event::ScriptFinished { kind, code }).await;
                });
            });
            let launched = services.catalog.launch(
                &services.runner,
                kind,
                app.firmware.as_deref(),
                &[],
                app.lang(),
                Some(on_complete),
            );
            match launched {
                Ok(_) => app.on_script_started(kind),
                Err(err) => {
                    app.on_script_failed(kind);
                    app.set_status_warning(err.to_string());
                }
            }
        }
        AppAction::Clear(kind) => {
            sink.clear(&LogChannel::named(kind.channel()));
            app.set_status_message(t(app.lang(), Key::LogsCleared));
        }
        AppAction::ClearAll => {
            sink.clear(&LogChannel::Broadcast);
            app.set_status_message(t(app.lang(), Key::LogsCleared));
        }
        AppAction::SetDebug(enabled) => {
            sink.set_debug_enabled(enabled);
            let state = if enabled { Key::On } else { Key::Off };
            app.set_status_message(format!(
                "{} {}",
                t(app.lang(), Key::DebugMode),
                t(app.lang(), state)
            ));
        }
        AppAction::SettingsChanged | AppAction::SaveSettings => persist(store, app),
        AppAction::ReloadKeywords => {
            let path = services.keywords_path();
            let classifier = Classifier::new(load_keywords(path.as_deref()));
            tracing::info!("reloaded {} custom keyword rules", classifier.custom_rules().len());
            sink.set_classifier(classifier);
            app.set_status_message(t(app.lang(), Key::KeywordsReloaded));
        }
        AppAction::FirmwareSelected(path) => {
            sink.info(
                &LogChannel::named(ScriptKind::Burn.channel()),
                &format!("{} {}", t(app.lang(), Key::FirmwareFile), path.display()),
            );
        }
        AppAction::ScanPorts => {
            let sink = sink.clone();
            tokio::task::spawn_blocking(move || ports::scan_ports(&sink));
        }
        AppAction::Quit | AppAction::None => {}
    }
}

fn spawn_input_listener(tx: mpsc::Sender<Event>) {
    std::thread::spawn(move || loop {
        if crossterm::event::poll(Duration::from_millis(100)).unwrap_or(false) {
            let event = match crossterm::event::read() {
                Ok(crossterm::event::Event::Key(key)) => Event::Key(key),
                Ok(crossterm::event::Event::Mouse(mouse)) => Event::Mouse(mouse),
                Ok(crossterm::event::Event::Resize(width, height)) => Event::Resize { width, height },
                _ => continue,
            };
            if tx.blocking_send(event).is_err() {
                break;
            }
        }
    });
}

fn help_styles() -> Styles {
    Styles::styled()
        .header(
            Style::new()
                .fg_color(Some(AnsiColor::Cyan.into()))
                .effects(Effects::BOLD),
        )
        .usage(
            Style::new()
                .fg_color(Some(AnsiColor::Green.into()))
                .effects(Effects::BOLD),
        )
        .literal(Style::new().fg_color(Some(AnsiColor::Yellow.into())))
        .placeholder(Style::new().fg_color(Some(AnsiColor::Magenta.into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_subcommand_takes_script_and_trailing_args() {
        let cli = Cli::try_parse_from([
            "mu310-tools",
            "--resources",
            "bundle",
            "run",
            "upgrade",
            "--firmware",
            "fw.bin",
            "--",
            "-x",
        ])
        .unwrap();
        match &cli.command {
            Some(Commands::Run {
                script,
                firmware,
                args,
            }) => {
                assert_eq!(*script, ScriptKind::Burn);
                assert_eq!(firmware.as_deref(), Some(Path::new("fw.bin")));
                assert_eq!(args, &vec!["-x".to_string()]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.config_path(), PathBuf::from("bundle").join("config.json"));
    }

    #[test]
    fn ports_subcommand_parses_with_global_flags() {
        let cli = Cli::try_parse_from(["mu310-tools", "ports", "--log-dir", "out"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Ports)));
        assert_eq!(cli.log_dir, PathBuf::from("out"));
    }

    #[test]
    fn defaults_apply_without_flags() {
        let cli = Cli::try_parse_from(["mu310-tools"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_dir, PathBuf::from("logs"));
        assert_eq!(cli.max_lines, DEFAULT_MAX_LINES);
        assert!(!cli.debug);
    }

    #[test]
    fn negative_and_large_codes_exit_with_one() {
        assert_eq!(exit_status(0), 0);
        assert_eq!(exit_status(3), 3);
        assert_eq!(exit_status(-1), 1);
        assert_eq!(exit_status(300), 1);
    }

    #[test]
    fn version_has_build_suffix() {
        assert!(version_string().starts_with(env!("CARGO_PKG_VERSION")));
        assert!(version_string().contains('-'));
    }
}
