//! Session recorder: one timestamped log file per run, echoed to the console.
//!
//! The recorder is a scoped resource. [`SessionRecorder::open`] moves any
//! same-named file out of the way, writes an opening record, and the closing
//! record is written either by [`SessionRecorder::close`] or by [`Drop`] on
//! early returns. Write failures degrade to console-only output with a single
//! warning; they never abort a run.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, SecondsFormat};
use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::core::errors::{RclError, Result};

/// Suffix appended to a pre-existing log of the same name.
pub const ROTATED_MARKER: &str = ".old";

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Per-entry detail, such as every removed path.
    Verbose,
    /// Narrative progress.
    Info,
    /// Recoverable failure that was skipped.
    Warn,
    /// Failure of a whole step.
    Error,
}

impl LogLevel {
    const fn label(self) -> &'static str {
        match self {
            Self::Verbose => "VERBOSE",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// On-disk layout of the session log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One human-readable line per record.
    #[default]
    Text,
    /// One JSON object per line.
    Jsonl,
}

/// What the recorder mirrors to the console.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConsoleEcho {
    /// Nothing (JSON output mode, tests).
    Off,
    /// Warnings and errors only.
    Quiet,
    /// Info and above.
    #[default]
    Normal,
    /// Everything, including per-entry removals.
    Verbose,
}

impl ConsoleEcho {
    const fn shows(self, level: LogLevel) -> bool {
        match self {
            Self::Off => false,
            Self::Quiet => matches!(level, LogLevel::Warn | LogLevel::Error),
            Self::Normal => !matches!(level, LogLevel::Verbose),
            Self::Verbose => true,
        }
    }
}

/// A single session-log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    pub ts: DateTime<Local>,
    pub level: LogLevel,
    pub event: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl LogRecord {
    #[must_use]
    pub fn new(level: LogLevel, event: &str, message: impl Into<String>) -> Self {
        Self {
            ts: Local::now(),
            level,
            event: event.to_string(),
            message: message.into(),
            path: None,
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.to_path_buf());
        self
    }

    fn to_text_line(&self) -> String {
        let mut line = format!(
            "{} {:<7} {}: {}",
            self.ts.to_rfc3339_opts(SecondsFormat::Millis, false),
            self.level.label(),
            self.event,
            self.message
        );
        if let Some(path) = &self.path {
            line.push_str(&format!(" [{}]", path.display()));
        }
        line
    }
}

/// Sink for run narrative. Implemented by the file-backed recorder and by the
/// in-memory log used for previews and tests.
pub trait RunLog {
    fn emit(&mut self, record: LogRecord);

    fn info(&mut self, event: &str, message: &str) {
        self.emit(LogRecord::new(LogLevel::Info, event, message));
    }

    fn verbose(&mut self, event: &str, message: &str) {
        self.emit(LogRecord::new(LogLevel::Verbose, event, message));
    }

    fn warn(&mut self, event: &str, message: &str) {
        self.emit(LogRecord::new(LogLevel::Warn, event, message));
    }

    fn error(&mut self, event: &str, message: &str) {
        self.emit(LogRecord::new(LogLevel::Error, event, message));
    }
}

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct MemoryLog {
    pub records: Vec<LogRecord>,
}

impl MemoryLog {
    /// Records carrying the given event name.
    pub fn events<'a>(&'a self, event: &'a str) -> impl Iterator<Item = &'a LogRecord> + 'a {
        self.records.iter().filter(move |r| r.event == event)
    }
}

impl RunLog for MemoryLog {
    fn emit(&mut self, record: LogRecord) {
        self.records.push(record);
    }
}

/// File-backed session log for one run.
pub struct SessionRecorder {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    format: LogFormat,
    echo: ConsoleEcho,
    records_written: usize,
}

impl SessionRecorder {
    /// Open `<dir>/<stem>-<YYYYmmdd-HHMMSS>.log`.
    ///
    /// A pre-existing file with that name is renamed with the
    /// [`ROTATED_MARKER`] suffix rather than overwritten.
    pub fn open(
        dir: &Path,
        stem: &str,
        started_at: DateTime<Local>,
        format: LogFormat,
        echo: ConsoleEcho,
    ) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| RclError::io(dir, e))?;
        let path = dir.join(log_file_name(stem, started_at));
        if path.exists() {
            let rotated = rotated_path(&path);
            std::fs::rename(&path, &rotated).map_err(|e| RclError::io(&path, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| RclError::io(&path, e))?;

        let mut recorder = Self {
            path,
            writer: Some(BufWriter::new(file)),
            format,
            echo,
            records_written: 0,
        };
        let opened = format!("session log opened at {}", recorder.path.display());
        recorder.emit(LogRecord::new(LogLevel::Info, "session.open", opened));
        Ok(recorder)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn records_written(&self) -> usize {
        self.records_written
    }

    /// Write the closing record and flush. Returns the log path.
    pub fn close(mut self) -> PathBuf {
        self.finish();
        self.path.clone()
    }

    fn finish(&mut self) {
        if self.writer.is_none() {
            return;
        }
        self.emit(LogRecord::new(
            LogLevel::Verbose,
            "session.close",
            "session log closed",
        ));
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }

    fn write_record(&mut self, record: &LogRecord) -> io::Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        match self.format {
            LogFormat::Text => writeln!(writer, "{}", record.to_text_line()),
            LogFormat::Jsonl => {
                serde_json::to_writer(&mut *writer, record).map_err(io::Error::other)?;
                writeln!(writer)
            }
        }
    }
}

impl RunLog for SessionRecorder {
    fn emit(&mut self, record: LogRecord) {
        echo_record(self.echo, &record);
        if self.writer.is_none() {
            return;
        }
        match self.write_record(&record) {
            Ok(()) => self.records_written += 1,
            Err(err) => {
                if self.writer.take().is_some() {
                    eprintln!(
                        "{} session log {} is no longer writable ({err}); continuing without it",
                        "WARNING:".yellow().bold(),
                        self.path.display()
                    );
                }
            }
        }
    }
}

impl Drop for SessionRecorder {
    fn drop(&mut self) {
        self.finish();
    }
}

/// File name for a run started at `started_at`.
#[must_use]
pub fn log_file_name(stem: &str, started_at: DateTime<Local>) -> String {
    format!("{stem}-{}.log", started_at.format("%Y%m%d-%H%M%S"))
}

fn rotated_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(ROTATED_MARKER);
    path.with_file_name(name)
}

fn echo_record(echo: ConsoleEcho, record: &LogRecord) {
    if !echo.shows(record.level) {
        return;
    }
    let mut message = record.message.clone();
    if let Some(path) = &record.path {
        message.push_str(&format!(" ({})", path.display()));
    }
    match record.level {
        LogLevel::Verbose => println!("  {}", message.dimmed()),
        LogLevel::Info => println!("{message}"),
        LogLevel::Warn => println!("{} {}", "WARNING:".yellow().bold(), message.yellow()),
        LogLevel::Error => eprintln!("{} {}", "ERROR:".red().bold(), message.red()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_start() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn open_writes_opening_and_closing_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = SessionRecorder::open(
            dir.path(),
            "disk-reclaim",
            fixed_start(),
            LogFormat::Text,
            ConsoleEcho::Off,
        )
        .unwrap();
        assert_eq!(recorder.records_written(), 1);
        recorder.warn("task.failed", "could not stop service");
        recorder.error("tool.failed", "cleanmgr could not be launched");
        assert_eq!(recorder.records_written(), 3);
        let path = recorder.close();

        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "disk-reclaim-20260314-092653.log"
        );
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("session.open"));
        assert!(lines[1].contains("WARN") && lines[1].contains("could not stop service"));
        assert!(lines[2].contains("ERROR") && lines[2].contains("tool.failed"));
        assert!(lines[3].contains("session.close"));
    }

    #[test]
    fn existing_log_is_renamed_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let name = log_file_name("disk-reclaim", fixed_start());
        std::fs::write(dir.path().join(&name), "previous run\n").unwrap();

        let recorder = SessionRecorder::open(
            dir.path(),
            "disk-reclaim",
            fixed_start(),
            LogFormat::Text,
            ConsoleEcho::Off,
        )
        .unwrap();
        drop(recorder);

        let rotated = dir.path().join(format!("{name}{ROTATED_MARKER}"));
        assert_eq!(std::fs::read_to_string(rotated).unwrap(), "previous run\n");
        let current = std::fs::read_to_string(dir.path().join(&name)).unwrap();
        assert!(current.contains("session.open"));
    }

    #[test]
    fn drop_closes_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let recorder = SessionRecorder::open(
                dir.path(),
                "early",
                fixed_start(),
                LogFormat::Text,
                ConsoleEcho::Off,
            )
            .unwrap();
            recorder.path().to_path_buf()
        };
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.lines().last().unwrap().contains("session.close"));
    }

    #[test]
    fn jsonl_records_parse_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = SessionRecorder::open(
            dir.path(),
            "json",
            fixed_start(),
            LogFormat::Jsonl,
            ConsoleEcho::Off,
        )
        .unwrap();
        recorder.emit(
            LogRecord::new(LogLevel::Verbose, "removed", "Removed old.tmp")
                .with_path(Path::new("/tmp/old.tmp")),
        );
        let path = recorder.close();

        let text = std::fs::read_to_string(path).unwrap();
        let removed: serde_json::Value = text
            .lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap())
            .find(|value| value["event"] == "removed")
            .unwrap();
        assert_eq!(removed["level"], "verbose");
        assert_eq!(removed["path"], "/tmp/old.tmp");
    }

    #[test]
    fn quiet_echo_only_shows_problems() {
        assert!(ConsoleEcho::Quiet.shows(LogLevel::Warn));
        assert!(!ConsoleEcho::Quiet.shows(LogLevel::Info));
        assert!(!ConsoleEcho::Normal.shows(LogLevel::Verbose));
        assert!(ConsoleEcho::Verbose.shows(LogLevel::Verbose));
        assert!(!ConsoleEcho::Off.shows(LogLevel::Error));
    }
}
