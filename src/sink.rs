//! The multi-destination log sink.
//!
//! Every entry is first appended to the session transcript as plain text and then
//! classified and handed to the registered views as `ViewUpdate`s. Nothing here
//! blocks or returns an error: the transcript is best-effort and a view that has
//! gone away is skipped silently.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{Context, Result};
use chrono::Local;
use ratatui::style::Color;
use tokio::sync::mpsc;

use crate::classify::{palette, Classifier};
use crate::output::{RenderedLine, ViewBuffer, ViewUpdate};

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Info,
    Debug,
    Warning,
    Error,
    Success,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Success => "SUCCESS",
        }
    }

    /// Color of the `LEVEL: ` label.
    pub fn color(self) -> Color {
        match self {
            LogLevel::Success => palette::SUCCESS,
            LogLevel::Error => palette::ERROR,
            LogLevel::Warning => palette::WARNING,
            LogLevel::Info => palette::INFO,
            LogLevel::Debug => palette::DEBUG,
        }
    }
}

/// Destination of a log entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogChannel {
    /// Every registered view.
    Broadcast,
    /// The view registered under exactly this name, if any.
    Named(String),
}

impl LogChannel {
    pub fn named(name: impl Into<String>) -> Self {
        LogChannel::Named(name.into())
    }
}

/// Append-only plain-text session log.
#[derive(Debug)]
pub struct Transcript {
    path: Option<PathBuf>,
    file: Mutex<Option<File>>,
}

impl Transcript {
    /// Opens (or creates) `path` for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open transcript {}", path.display()))?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            file: Mutex::new(Some(file)),
        })
    }

    /// Opens `<dir>/session_<YYYYMMDD_HHMMSS>.log`.
    ///
    /// Falls back to a disabled transcript when the file cannot be opened.
    pub fn open_session(dir: &Path) -> Self {
        let name = format!("session_{}.log", Local::now().format("%Y%m%d_%H%M%S"));
        match Self::open(&dir.join(name)) {
            Ok(transcript) => transcript,
            Err(err) => {
                tracing::warn!("{:#}; continuing without a transcript", err);
                Self::disabled()
            }
        }
    }

    /// A transcript that drops everything.
    pub fn disabled() -> Self {
        Self {
            path: None,
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn append(&self, line: &str) {
        let Ok(mut guard) = self.file.lock() else {
            return;
        };
        if let Some(file) = guard.as_mut() {
            if let Err(err) = file.write_all(line.as_bytes()) {
                tracing::debug!("transcript write failed: {}", err);
            }
        }
    }
}

struct SinkInner {
    transcript: Transcript,
    classifier: RwLock<Arc<Classifier>>,
    channels: RwLock<Vec<String>>,
    debug: AtomicBool,
    max_lines: usize,
    updates: mpsc::UnboundedSender<ViewUpdate>,
}

/// Cloneable handle to the shared log sink.
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<SinkInner>,
}

impl LogSink {
    /// Creates a sink and the receiving end of its view update queue.
    #[cfg(test)]
    pub fn new(
        transcript: Transcript,
        classifier: Classifier,
    ) -> (Self, mpsc::UnboundedReceiver<ViewUpdate>) {
        Self::with_max_lines(transcript, classifier, crate::output::DEFAULT_MAX_LINES)
    }

    pub fn with_max_lines(
        transcript: Transcript,
        classifier: Classifier,
        max_lines: usize,
    ) -> (Self, mpsc::UnboundedReceiver<ViewUpdate>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let sink = Self {
            inner: Arc::new(SinkInner {
                transcript,
                classifier: RwLock::new(Arc::new(classifier)),
                channels: RwLock::new(Vec::new()),
                debug: AtomicBool::new(false),
                max_lines,
                updates,
            }),
        };
        (sink, rx)
    }

    /// Registers a view under `channel` and returns its (empty) buffer.
    ///
    /// Registering the same name twice keeps a single routing entry.
    pub fn register_buffer(&self, channel: &str) -> ViewBuffer {
        if let Ok(mut channels) = self.inner.channels.write() {
            if !channels.iter().any(|c| c == channel) {
                channels.push(channel.to_string());
            }
        }
        ViewBuffer::new(channel, self.inner.max_lines)
    }

    /// Registered channel names in registration order.
    pub fn channels(&self) -> Vec<String> {
        self.inner
            .channels
            .read()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn transcript_path(&self) -> Option<&Path> {
        self.inner.transcript.path()
    }

    pub fn set_debug_enabled(&self, enabled: bool) {
        self.inner.debug.store(enabled, Ordering::Relaxed);
    }

    pub fn debug_enabled(&self) -> bool {
        self.inner.debug.load(Ordering::Relaxed)
    }

    /// Replaces the keyword classifier used for subsequent entries.
    pub fn set_classifier(&self, classifier: Classifier) {
        if let Ok(mut current) = self.inner.classifier.write() {
            *current = Arc::new(classifier);
        }
    }

    /// Records one entry: transcript first, then every matching view.
    pub fn log(&self, level: LogLevel, channel: &LogChannel, message: &str) {
        let now = Local::now();
        let timestamp = format!("[{}] ", now.format("%H:%M:%S"));
        self.inner
            .transcript
            .append(&format!("{}{}: {}\n", timestamp, level.as_str(), message));

        let targets = self.targets(channel);
        if targets.is_empty() {
            return;
        }
        let classifier = match self.inner.classifier.read() {
            Ok(classifier) => Arc::clone(&*classifier),
            Err(_) => return,
        };
        let line = RenderedLine {
            timestamp,
            level,
            segments: classifier.classify(message),
        };
        for channel in targets {
            // A closed receiver means the view is gone; keep going for the others.
            let _ = self.inner.updates.send(ViewUpdate::Append {
                channel,
                line: line.clone(),
            });
        }
    }

    pub fn info(&self, channel: &LogChannel, message: &str) {
        self.log(LogLevel::Info, channel, message);
    }

    /// Logs at DEBUG level, only while debug mode is on.
    pub fn debug(&self, channel: &LogChannel, message: &str) {
        if self.debug_enabled() {
            self.log(LogLevel::Debug, channel, message);
        }
    }

    pub fn warning(&self, channel: &LogChannel, message: &str) {
        self.log(LogLevel::Warning, channel, message);
    }

    pub fn error(&self, channel: &LogChannel, message: &str) {
        self.log(LogLevel::Error, channel, message);
    }

    pub fn success(&self, channel: &LogChannel, message: &str) {
        self.log(LogLevel::Success, channel, message);
    }

    /// Empties the matching view(s). The transcript is left untouched.
    pub fn clear(&self, channel: &LogChannel) {
        for channel in self.targets(channel) {
            let _ = self.inner.updates.send(ViewUpdate::Clear { channel });
        }
    }

    fn targets(&self, channel: &LogChannel) -> Vec<String> {
        let Ok(channels) = self.inner.channels.read() else {
            return Vec::new();
        };
        match channel {
            LogChannel::Broadcast => channels.clone(),
            LogChannel::Named(name) => channels.iter().filter(|c| *c == name).cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::CustomRule;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ViewUpdate>) -> Vec<ViewUpdate> {
        let mut out = Vec::new();
        while let Ok(update) = rx.try_recv() {
            out.push(update);
        }
        out
    }

    fn transcript_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn appended(updates: &[ViewUpdate]) -> Vec<(String, String)> {
        updates
            .iter()
            .filter_map(|u| match u {
                ViewUpdate::Append { channel, line } => Some((channel.clone(), line.message())),
                ViewUpdate::Clear { .. } => None,
            })
            .collect()
    }

    #[test]
    fn broadcast_reaches_registered_views_and_logs_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");
        let (sink, mut rx) = LogSink::new(Transcript::open(&path).unwrap(), Classifier::default());
        sink.register_buffer("adb");
        sink.register_buffer("fix");

        sink.info(&LogChannel::Broadcast, "hello");
        sink.info(&LogChannel::named("upgrade"), "nobody listens");

        let updates = drain(&mut rx);
        assert_eq!(
            appended(&updates),
            vec![
                ("adb".to_string(), "hello".to_string()),
                ("fix".to_string(), "hello".to_string()),
            ]
        );
        let lines = transcript_lines(&path);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("] INFO: hello"));
        assert!(lines[1].ends_with("] INFO: nobody listens"));
    }

    #[test]
    fn named_channel_reaches_only_its_view() {
        let (sink, mut rx) = LogSink::new(Transcript::disabled(), Classifier::default());
        sink.register_buffer("adb");
        sink.register_buffer("fix");
        sink.error(&LogChannel::named("fix"), "boom");
        let updates = drain(&mut rx);
        assert_eq!(appended(&updates), vec![("fix".to_string(), "boom".to_string())]);
        match &updates[0] {
            ViewUpdate::Append { line, .. } => assert_eq!(line.level, LogLevel::Error),
            other => panic!("unexpected update {:?}", other),
        }
    }

    #[test]
    fn a_view_named_all_is_just_another_channel() {
        let (sink, mut rx) = LogSink::new(Transcript::disabled(), Classifier::default());
        sink.register_buffer("all");
        sink.register_buffer("adb");
        sink.info(&LogChannel::named("all"), "only one");
        assert_eq!(
            appended(&drain(&mut rx)),
            vec![("all".to_string(), "only one".to_string())]
        );
    }

    #[test]
    fn debug_is_silent_unless_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");
        let (sink, mut rx) = LogSink::new(Transcript::open(&path).unwrap(), Classifier::default());
        sink.register_buffer("adb");

        sink.debug(&LogChannel::Broadcast, "hidden");
        assert!(drain(&mut rx).is_empty());
        assert!(transcript_lines(&path).is_empty());

        sink.set_debug_enabled(true);
        sink.debug(&LogChannel::Broadcast, "shown");
        let updates = drain(&mut rx);
        assert_eq!(updates.len(), 1);
        match &updates[0] {
            ViewUpdate::Append { line, .. } => {
                assert_eq!(line.level, LogLevel::Debug);
                assert_eq!(line.level_label(), "DEBUG: ");
            }
            other => panic!("unexpected update {:?}", other),
        }
        assert_eq!(transcript_lines(&path).len(), 1);
    }

    #[test]
    fn transcript_counts_calls_not_views() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("session.log");
        let (sink, _rx) = LogSink::new(Transcript::open(&path).unwrap(), Classifier::default());
        for name in ["adb", "fix", "upgrade"] {
            sink.register_buffer(name);
        }
        sink.info(&LogChannel::Broadcast, "one");
        sink.warning(&LogChannel::named("adb"), "two");
        sink.success(&LogChannel::named("missing"), "three");
        sink.error(&LogChannel::Broadcast, "four");
        let lines = transcript_lines(&path);
        assert_eq!(lines.len(), 4);
        assert!(lines[1].contains("WARNING: two"));
        assert!(lines[2].contains("SUCCESS: three"));
    }

    #[test]
    fn late_registration_receives_later_entries() {
        let (sink, mut rx) = LogSink::new(Transcript::disabled(), Classifier::default());
        sink.info(&LogChannel::Broadcast, "before");
        assert!(drain(&mut rx).is_empty());
        sink.register_buffer("adb");
        sink.register_buffer("adb");
        sink.info(&LogChannel::Broadcast, "after");
        assert_eq!(
            appended(&drain(&mut rx)),
            vec![("adb".to_string(), "after".to_string())]
        );
        assert_eq!(sink.channels(), vec!["adb".to_string()]);
    }

    #[test]
    fn clear_targets_views_without_touching_the_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");
        let (sink, mut rx) = LogSink::new(Transcript::open(&path).unwrap(), Classifier::default());
        sink.register_buffer("adb");
        sink.register_buffer("fix");
        sink.info(&LogChannel::named("adb"), "kept in transcript");
        drain(&mut rx);

        sink.clear(&LogChannel::named("adb"));
        assert_eq!(
            drain(&mut rx),
            vec![ViewUpdate::Clear {
                channel: "adb".into()
            }]
        );
        sink.clear(&LogChannel::Broadcast);
        assert_eq!(drain(&mut rx).len(), 2);
        assert_eq!(transcript_lines(&path).len(), 1);
    }

    #[test]
    fn concurrent_entries_are_written_whole() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 200;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");
        let (sink, _rx) = LogSink::new(Transcript::open(&path).unwrap(), Classifier::default());
        sink.register_buffer("adb");
        let filler = "x".repeat(200);

        let handles: Vec<_> = (0..THREADS)
            .map(|thread| {
                let sink = sink.clone();
                let filler = filler.clone();
                std::thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        sink.info(&LogChannel::Broadcast, &format!("t{thread} n{i} {filler}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let lines = transcript_lines(&path);
        assert_eq!(lines.len(), THREADS * PER_THREAD);
        let mut next = vec![0usize; THREADS];
        for line in &lines {
            let body = line.split_once("] INFO: ").map(|(_, body)| body).unwrap();
            let mut words = body.split(' ');
            let thread: usize = words.next().unwrap()[1..].parse().unwrap();
            let i: usize = words.next().unwrap()[1..].parse().unwrap();
            assert_eq!(words.next(), Some(filler.as_str()));
            assert_eq!(words.next(), None);
            assert_eq!(i, next[thread], "entries of one thread stay in call order");
            next[thread] += 1;
        }
    }

    #[test]
    fn closed_view_queue_does_not_break_logging() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");
        let (sink, rx) = LogSink::new(Transcript::open(&path).unwrap(), Classifier::default());
        sink.register_buffer("adb");
        drop(rx);
        sink.info(&LogChannel::Broadcast, "still written");
        assert_eq!(transcript_lines(&path).len(), 1);
    }

    #[test]
    fn entries_are_classified_with_the_current_rules() {
        let (sink, mut rx) = LogSink::new(Transcript::disabled(), Classifier::default());
        sink.register_buffer("adb");
        sink.set_classifier(Classifier::new(vec![CustomRule::new(
            "usbcfg",
            Color::Rgb(0, 0xFF, 0),
        )]));
        sink.info(&LogChannel::Broadcast, "set usbcfg now");
        let updates = drain(&mut rx);
        let ViewUpdate::Append { line, .. } = &updates[0] else {
            panic!("expected an append");
        };
        assert_eq!(line.segments.len(), 3);
        assert_eq!(line.segments[1].text, "usbcfg");
        assert!(line.segments[1].style.is_some());
    }

    #[test]
    fn session_transcript_is_named_by_start_time() {
        let dir = tempfile::tempdir().unwrap();
        let transcript = Transcript::open_session(dir.path());
        let name = transcript
            .path()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap()
            .to_string();
        assert!(name.starts_with("session_"));
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), "session_YYYYMMDD_HHMMSS.log".len());
    }

    #[test]
    fn disabled_transcript_has_no_path() {
        let (sink, _rx) = LogSink::new(Transcript::disabled(), Classifier::default());
        assert!(sink.transcript_path().is_none());
        sink.info(&LogChannel::Broadcast, "dropped");
    }
}
