//! Process execution and output streaming.
//!
//! The `ProcessRunner` spawns a command with piped stdout/stderr and forwards
//! every line to the log sink. Each successful spawn owns three tasks: one reader
//! per stream and a waiter that reports the exit code once both readers drained.
//! Spawned processes are never killed or timed out; a hung child keeps its tasks
//! alive.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::output::sanitize_text;
use crate::sink::{LogChannel, LogLevel, LogSink};

/// Exit code reported when the command could not be started.
pub const SPAWN_FAILED: i32 = -1;

/// Callback invoked exactly once with the exit code.
pub type OnComplete = Box<dyn FnOnce(i32) + Send + 'static>;

/// Indicates the source stream of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Standard Output.
    Stdout,
    /// Standard Error.
    Stderr,
}

impl StreamKind {
    fn label(self) -> &'static str {
        match self {
            StreamKind::Stdout => "STDOUT",
            StreamKind::Stderr => "STDERR",
        }
    }
}

/// Optional settings for a single invocation.
#[derive(Default)]
pub struct RunOptions {
    /// Working directory.
    pub cwd: Option<PathBuf>,
    /// Variables added on top of the inherited environment.
    pub env: Option<HashMap<String, String>>,
    /// Run the command line through the platform shell.
    pub use_shell: bool,
    pub on_complete: Option<OnComplete>,
}

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to parse command: {0}")]
    Parse(#[from] shell_words::ParseError),
    #[error("empty command")]
    Empty,
    #[error("failed to start command: {0}")]
    Io(#[from] std::io::Error),
    #[error("double quotes are not allowed in script arguments: {0}")]
    Quoted(String),
}

/// Launches commands and streams their output into a `LogSink`.
#[derive(Clone)]
pub struct ProcessRunner {
    sink: LogSink,
}

impl ProcessRunner {
    pub fn new(sink: LogSink) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    /// Runs `command`, logging its output to `channel`.
    ///
    /// Never fails: a spawn error becomes an ERROR entry and `on_complete(-1)`.
    /// Must be called from within a tokio runtime.
    pub fn run(&self, command: &str, channel: LogChannel, options: RunOptions) {
        let RunOptions {
            cwd,
            env,
            use_shell,
            on_complete,
        } = options;
        let sink = &self.sink;

        if sink.debug_enabled() {
            sink.debug(&channel, &format!("[DEBUG] command: {}", command));
            if let Some(cwd) = &cwd {
                sink.debug(&channel, &format!("[DEBUG] working directory: {}", cwd.display()));
            }
            if let Some(env) = env.as_ref().filter(|env| !env.is_empty()) {
                let mut vars: Vec<_> = env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                vars.sort();
                sink.debug(&channel, &format!("[DEBUG] environment: {}", vars.join(" ")));
            }
        }
        sink.info(&channel, &format!("[RUN] {}", command));

        let child = build_command(command, use_shell).and_then(|mut cmd| {
            if let Some(cwd) = &cwd {
                cmd.current_dir(cwd);
            }
            if let Some(env) = &env {
                cmd.envs(env);
            }
            cmd.stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
            Ok(cmd.spawn()?)
        });
        let mut child = match child {
            Ok(child) => child,
            Err(err) => {
                tracing::debug!("spawn of `{}` failed: {}", command, err);
                sink.error(&channel, &err.to_string());
                if let Some(on_complete) = on_complete {
                    on_complete(SPAWN_FAILED);
                }
                return;
            }
        };

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(read_stream(
                StreamKind::Stdout,
                stdout,
                sink.clone(),
                channel.clone(),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(read_stream(
                StreamKind::Stderr,
                stderr,
                sink.clone(),
                channel.clone(),
            )));
        }

        let sink = sink.clone();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => exit_code(status),
                Err(err) => {
                    sink.error(&channel, &format!("failed to wait for command: {}", err));
                    SPAWN_FAILED
                }
            };
            // Exit is reported after the last line of output.
            for reader in readers {
                let _ = reader.await;
            }
            sink.debug(&channel, &format!("[DEBUG] process exited with code {}", code));
            sink.info(&channel, &format!("[EXIT] code={}", code));
            if let Some(on_complete) = on_complete {
                on_complete(code);
            }
        });
    }

    /// Runs a vendor script through the platform shell with a UTF-8 console.
    pub fn run_bat_file(
        &self,
        path: &Path,
        args: &[String],
        channel: LogChannel,
        cwd: Option<PathBuf>,
        on_complete: Option<OnComplete>,
    ) {
        if self.sink.debug_enabled() {
            self.sink
                .debug(&channel, &format!("[DEBUG] script: {}", path.display()));
        }
        let command = match script_command_line(path, args) {
            Ok(command) => command,
            Err(err) => {
                self.sink.error(&channel, &err.to_string());
                if let Some(on_complete) = on_complete {
                    on_complete(SPAWN_FAILED);
                }
                return;
            }
        };
        self.run(
            &command,
            channel,
            RunOptions {
                cwd,
                env: None,
                use_shell: true,
                on_complete,
            },
        );
    }
}

/// Builds the shell command line that launches a script with `args`.
#[cfg(windows)]
pub fn script_command_line(path: &Path, args: &[String]) -> Result<String, SpawnError> {
    // chcp 65001 switches the console code page to UTF-8 before the script runs.
    let mut line = format!(
        "cmd /c chcp 65001 > nul & call {}",
        cmd_quote(&path.display().to_string())?
    );
    for arg in args {
        line.push(' ');
        line.push_str(&cmd_quote(arg)?);
    }
    Ok(line)
}

/// Builds the shell command line that launches a script with `args`.
#[cfg(not(windows))]
pub fn script_command_line(path: &Path, args: &[String]) -> Result<String, SpawnError> {
    let path = path.display().to_string();
    let mut words = vec!["sh".to_string(), shell_words::quote(&path).into_owned()];
    words.extend(args.iter().map(|arg| shell_words::quote(arg).into_owned()));
    Ok(words.join(" "))
}

/// Wraps `word` in double quotes for `cmd`. There is no escape for a quote
/// inside a quoted `cmd` argument, so such words are refused.
#[cfg(any(windows, test))]
fn cmd_quote(word: &str) -> Result<String, SpawnError> {
    if word.contains('"') {
        return Err(SpawnError::Quoted(word.to_string()));
    }
    Ok(format!("\"{}\"", word))
}

fn build_command(command: &str, use_shell: bool) -> Result<Command, SpawnError> {
    if command.trim().is_empty() {
        return Err(SpawnError::Empty);
    }
    if use_shell {
        return Ok(shell_command(command));
    }
    let mut parts = shell_words::split(command)?;
    if parts.is_empty() {
        return Err(SpawnError::Empty);
    }
    let program = parts.remove(0);
    let mut cmd = Command::new(program);
    cmd.args(parts);
    Ok(cmd)
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").raw_arg(command);
    cmd
}

#[cfg(not(windows))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| -signal))
        .unwrap_or(SPAWN_FAILED)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(SPAWN_FAILED)
}

/// A line of child output after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DecodedLine {
    /// `raw` is the lossy decoding before sanitizing, `text` what is displayed.
    Text { raw: String, text: String },
    /// Nothing in the line decoded; carries an escaped byte representation.
    Raw(String),
}

fn decode_line(raw: &[u8]) -> DecodedLine {
    let mut end = raw.len();
    while end > 0 && matches!(raw[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    let bytes = &raw[..end];
    let lossy = String::from_utf8_lossy(bytes);
    if !lossy.is_empty() && lossy.chars().all(|c| c == char::REPLACEMENT_CHARACTER) {
        return DecodedLine::Raw(format!("b\"{}\"", bytes.escape_ascii()));
    }
    DecodedLine::Text {
        text: sanitize_text(&lossy).trim_end().to_string(),
        raw: lossy.into_owned(),
    }
}

/// Makes control characters of a raw line visible, keeping tabs.
fn visible_controls(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_control() && c != '\t' {
                c.escape_default().to_string()
            } else {
                c.to_string()
            }
        })
        .collect()
}

fn emit_line(sink: &LogSink, channel: &LogChannel, stream: StreamKind, raw: &[u8]) {
    let (raw, text, level) = match decode_line(raw) {
        DecodedLine::Text { raw, text } => {
            let level = match stream {
                StreamKind::Stdout => LogLevel::Info,
                StreamKind::Stderr => LogLevel::Error,
            };
            (raw, text, level)
        }
        DecodedLine::Raw(repr) => (repr.clone(), repr, LogLevel::Error),
    };
    if sink.debug_enabled() {
        sink.debug(channel, &format!("{}: {}", stream.label(), visible_controls(&raw)));
    }
    sink.log(level, channel, &text);
}

async fn read_stream<R>(stream: StreamKind, reader: R, sink: LogSink, channel: LogChannel)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut raw = Vec::new();
    loop {
        raw.clear();
        match reader.read_until(b'\n', &mut raw).await {
            Ok(0) => break,
            Ok(_) => emit_line(&sink, &channel, stream, &raw),
            Err(err) => {
                sink.error(
                    &channel,
                    &format!("{} read failed: {}", stream.label().to_lowercase(), err),
                );
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::{mpsc, oneshot};

    use crate::classify::Classifier;
    use crate::output::ViewUpdate;
    use crate::sink::Transcript;

    fn sink() -> (LogSink, mpsc::UnboundedReceiver<ViewUpdate>) {
        let (sink, rx) = LogSink::new(Transcript::disabled(), Classifier::default());
        sink.register_buffer("adb");
        (sink, rx)
    }

    fn completion() -> (OnComplete, oneshot::Receiver<i32>) {
        let (tx, rx) = oneshot::channel();
        let callback: OnComplete = Box::new(move |code| {
            let _ = tx.send(code);
        });
        (callback, rx)
    }

    fn entries(rx: &mut mpsc::UnboundedReceiver<ViewUpdate>) -> Vec<(LogLevel, String)> {
        let mut out = Vec::new();
        while let Ok(update) = rx.try_recv() {
            if let ViewUpdate::Append { line, .. } = update {
                out.push((line.level, line.message()));
            }
        }
        out
    }

    async fn wait(rx: oneshot::Receiver<i32>) -> i32 {
        tokio::time::timeout(Duration::from_secs(10), rx)
            .await
            .expect("process did not finish")
            .expect("completion dropped")
    }

    #[test]
    fn decode_strips_line_endings() {
        assert_eq!(
            decode_line(b"hello\r\n"),
            DecodedLine::Text {
                raw: "hello".into(),
                text: "hello".into()
            }
        );
        assert_eq!(
            decode_line(b"\n"),
            DecodedLine::Text {
                raw: String::new(),
                text: String::new()
            }
        );
    }

    #[test]
    fn decode_keeps_the_raw_line_next_to_the_display_text() {
        assert_eq!(
            decode_line(b"\x1b[32m10%\r100%  \r\n"),
            DecodedLine::Text {
                raw: "\u{1b}[32m10%\r100%  ".into(),
                text: "100%".into()
            }
        );
        assert_eq!(visible_controls("\u{1b}[32m10%\r100%\tok"), "\\u{1b}[32m10%\\r100%\tok");
    }

    #[test]
    fn decode_replaces_invalid_bytes_in_text() {
        assert_eq!(
            decode_line(b"ok \xff done\n"),
            DecodedLine::Text {
                raw: "ok \u{fffd} done".into(),
                text: "ok \u{fffd} done".into()
            }
        );
    }

    #[test]
    fn decode_falls_back_to_raw_for_undecodable_lines() {
        assert_eq!(
            decode_line(b"\xff\xfe\n"),
            DecodedLine::Raw("b\"\\xff\\xfe\"".into())
        );
    }

    #[test]
    fn shell_split_rejects_empty_and_unbalanced_commands() {
        assert!(matches!(build_command("   ", false), Err(SpawnError::Empty)));
        assert!(matches!(build_command("echo 'oops", false), Err(SpawnError::Parse(_))));
    }

    #[cfg(not(windows))]
    #[test]
    fn script_command_line_quotes_path_and_args() {
        let line = script_command_line(
            Path::new("/opt/tools/Burn_in _611GT.bat"),
            &["/fw/image v1.bin".to_string()],
        )
        .unwrap();
        assert_eq!(line, "sh '/opt/tools/Burn_in _611GT.bat' '/fw/image v1.bin'");
    }

    #[test]
    fn cmd_quoting_refuses_embedded_quotes() {
        assert_eq!(cmd_quote(r"C:\fw\image v1.bin").unwrap(), r#""C:\fw\image v1.bin""#);
        assert!(matches!(
            cmd_quote(r#"C:\fw\a" & del x & ".bin"#),
            Err(SpawnError::Quoted(_))
        ));
    }

    #[tokio::test]
    async fn missing_executable_reports_spawn_failure() {
        let (sink, mut rx) = sink();
        let runner = ProcessRunner::new(sink);
        let (on_complete, done) = completion();
        runner.run(
            "definitely-not-a-real-program-4242",
            LogChannel::named("adb"),
            RunOptions {
                on_complete: Some(on_complete),
                ..RunOptions::default()
            },
        );
        assert_eq!(wait(done).await, SPAWN_FAILED);
        let entries = entries(&mut rx);
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0],
            (LogLevel::Info, "[RUN] definitely-not-a-real-program-4242".into())
        );
        assert_eq!(entries[1].0, LogLevel::Error);
        assert!(entries[1].1.starts_with("failed to start command"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn streams_stdout_in_order_then_exit_code() {
        let (sink, mut rx) = sink();
        let runner = ProcessRunner::new(sink);
        let (on_complete, done) = completion();
        let command = "printf 'one\\ntwo\\nthree\\n'; exit 2";
        runner.run(
            command,
            LogChannel::named("adb"),
            RunOptions {
                use_shell: true,
                on_complete: Some(on_complete),
                ..RunOptions::default()
            },
        );
        assert_eq!(wait(done).await, 2);
        assert_eq!(
            entries(&mut rx),
            vec![
                (LogLevel::Info, format!("[RUN] {}", command)),
                (LogLevel::Info, "one".into()),
                (LogLevel::Info, "two".into()),
                (LogLevel::Info, "three".into()),
                (LogLevel::Info, "[EXIT] code=2".into()),
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stderr_lines_are_errors() {
        let (sink, mut rx) = sink();
        let runner = ProcessRunner::new(sink);
        let (on_complete, done) = completion();
        runner.run(
            "echo 'all good' >&2",
            LogChannel::named("adb"),
            RunOptions {
                use_shell: true,
                on_complete: Some(on_complete),
                ..RunOptions::default()
            },
        );
        assert_eq!(wait(done).await, 0);
        let entries = entries(&mut rx);
        assert!(entries.contains(&(LogLevel::Error, "all good".into())));
        assert_eq!(entries.last(), Some(&(LogLevel::Info, "[EXIT] code=0".into())));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn interleaved_streams_keep_their_own_order() {
        let (sink, mut rx) = sink();
        let runner = ProcessRunner::new(sink);
        let (on_complete, done) = completion();
        let command = "for i in 1 2 3 4 5; do echo out$i; echo err$i >&2; done; exit 3";
        runner.run(
            command,
            LogChannel::named("adb"),
            RunOptions {
                use_shell: true,
                on_complete: Some(on_complete),
                ..RunOptions::default()
            },
        );
        assert_eq!(wait(done).await, 3);
        let entries = entries(&mut rx);
        let outs: Vec<_> = entries
            .iter()
            .filter(|(level, text)| *level == LogLevel::Info && text.starts_with("out"))
            .map(|(_, text)| text.as_str())
            .collect();
        let errs: Vec<_> = entries
            .iter()
            .filter(|(level, _)| *level == LogLevel::Error)
            .map(|(_, text)| text.as_str())
            .collect();
        assert_eq!(outs, ["out1", "out2", "out3", "out4", "out5"]);
        assert_eq!(errs, ["err1", "err2", "err3", "err4", "err5"]);
        assert_eq!(entries.len(), 12);
        assert_eq!(entries.last(), Some(&(LogLevel::Info, "[EXIT] code=3".into())));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn debug_mode_duplicates_each_line() {
        let (sink, mut rx) = sink();
        sink.set_debug_enabled(true);
        let runner = ProcessRunner::new(sink);
        let (on_complete, done) = completion();
        runner.run(
            "echo hi",
            LogChannel::named("adb"),
            RunOptions {
                use_shell: true,
                on_complete: Some(on_complete),
                ..RunOptions::default()
            },
        );
        assert_eq!(wait(done).await, 0);
        let entries = entries(&mut rx);
        let hi = entries
            .iter()
            .position(|e| e == &(LogLevel::Info, "hi".to_string()))
            .expect("stdout line");
        assert_eq!(entries[hi - 1], (LogLevel::Debug, "STDOUT: hi".into()));
        assert_eq!(entries[0], (LogLevel::Debug, "[DEBUG] command: echo hi".into()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn direct_invocation_passes_args_and_env() {
        let (sink, mut rx) = sink();
        let runner = ProcessRunner::new(sink);
        let (on_complete, done) = completion();
        let dir = tempfile::tempdir().unwrap();
        let mut env = HashMap::new();
        env.insert("MU310_TEST_VALUE".to_string(), "from-env".to_string());
        runner.run(
            "sh -c 'echo \"$MU310_TEST_VALUE\"; pwd'",
            LogChannel::named("adb"),
            RunOptions {
                cwd: Some(dir.path().to_path_buf()),
                env: Some(env),
                use_shell: false,
                on_complete: Some(on_complete),
            },
        );
        assert_eq!(wait(done).await, 0);
        let entries = entries(&mut rx);
        assert_eq!(entries[1], (LogLevel::Info, "from-env".into()));
        let reported = std::fs::canonicalize(&entries[2].1).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_bat_file_runs_script_with_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("Burn_in _611GT.bat");
        std::fs::write(&script, "echo \"burning $1\"\nexit 3\n").unwrap();
        let (sink, mut rx) = sink();
        let runner = ProcessRunner::new(sink);
        let (on_complete, done) = completion();
        runner.run_bat_file(
            &script,
            &["fw.bin".to_string()],
            LogChannel::named("adb"),
            Some(dir.path().to_path_buf()),
            Some(on_complete),
        );
        assert_eq!(wait(done).await, 3);
        let entries = entries(&mut rx);
        assert!(entries[0].1.starts_with("[RUN] sh "));
        assert_eq!(entries[1], (LogLevel::Info, "burning fw.bin".into()));
        assert_eq!(entries[2], (LogLevel::Info, "[EXIT] code=3".into()));
    }
}
