//! Error reporting sinks.
//!
//! Failures the session manager absorbs still go somewhere: an
//! [`ErrorReporter`]. The default sends them to the `log` facade; the
//! file reporter keeps an append-only, timestamped trail on disk.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{SecondsFormat, Utc};

use crate::identity::IdentityError;

/// Destination for failures that are absorbed instead of returned.
pub trait ErrorReporter: Send + Sync {
    /// `context` names the operation that failed, e.g. `"reconcile"`.
    fn report(&self, context: &str, error: &IdentityError);
}

/// Reports through the `log` facade at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, context: &str, error: &IdentityError) {
        log::error!("{} error: {}", context, error);
    }
}

/// Thread-safe handle to an append-only log file.
pub type LogHandle = Arc<Mutex<Option<File>>>;

/// ISO 8601 UTC with milliseconds, e.g. `2026-02-04T10:15:30.123Z`.
fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Write a timestamped line to the log file (if present).
pub fn log_line(handle: &LogHandle, context: &str, data: &str) {
    let mut guard = handle.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(ref mut file) = *guard {
        let _ = writeln!(file, "[{}] {}: {}", utc_timestamp(), context, data);
        let _ = file.flush();
    }
}

/// Open (or create) `{log_dir}/{log_id}.log` and return a shared handle.
///
/// Without a directory, or if the file can't be opened, the handle is empty
/// and writes are dropped.
pub fn open_log_file(log_dir: Option<&Path>, log_id: &str) -> LogHandle {
    let file = log_dir.and_then(|dir| {
        std::fs::create_dir_all(dir).ok()?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(format!("{}.log", log_id)))
            .ok()
    });
    Arc::new(Mutex::new(file))
}

/// Appends each report to a log file and forwards it to the `log` facade.
#[derive(Clone)]
pub struct FileReporter {
    handle: LogHandle,
}

impl FileReporter {
    pub fn open(log_dir: Option<&Path>, log_id: &str) -> Self {
        Self {
            handle: open_log_file(log_dir, log_id),
        }
    }

    pub fn is_writing(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl ErrorReporter for FileReporter {
    fn report(&self, context: &str, error: &IdentityError) {
        LogReporter.report(context, error);
        log_line(&self.handle, context, &error.to_string());
    }
}

/// Keeps reports in memory, for assertions.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<(String, IdentityError)>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(String, IdentityError)> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, context: &str, error: &IdentityError) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((context.to_string(), error.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn utc_timestamp_format() {
        let ts = utc_timestamp();
        // YYYY-MM-DDTHH:MM:SS.mmmZ
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), 24);
        assert_eq!(&ts[10..11], "T");
        assert_eq!(&ts[19..20], ".");
    }

    #[test]
    fn open_log_file_creates_file() {
        let dir = tempdir().unwrap();
        let handle = open_log_file(Some(dir.path()), "session");
        assert!(handle.lock().unwrap().is_some());
        assert!(dir.path().join("session.log").exists());
    }

    #[test]
    fn open_log_file_none_dir() {
        let handle = open_log_file(None, "session");
        assert!(handle.lock().unwrap().is_none());
    }

    #[test]
    fn file_reporter_appends_lines() {
        let dir = tempdir().unwrap();
        let reporter = FileReporter::open(Some(dir.path()), "errors");
        assert!(reporter.is_writing());

        reporter.report("reconcile", &IdentityError::Transport("timed out".into()));
        reporter.report("logout", &IdentityError::Other("network down".into()));

        let mut contents = String::new();
        File::open(dir.path().join("errors.log"))
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();

        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("reconcile: Transport error: timed out"));
        assert!(lines[1].contains("logout: network down"));
    }

    #[test]
    fn file_reporter_without_dir_drops_writes() {
        let reporter = FileReporter::open(None, "errors");
        assert!(!reporter.is_writing());
        // Must not panic.
        reporter.report("reconcile", &IdentityError::Other("x".into()));
    }

    #[test]
    fn recording_reporter_keeps_order() {
        let reporter = RecordingReporter::new();
        assert!(reporter.is_empty());

        reporter.report("reconcile", &IdentityError::Other("a".into()));
        reporter.report("logout", &IdentityError::Other("b".into()));

        let reports = reporter.reports();
        assert_eq!(reporter.len(), 2);
        assert_eq!(reports[0].0, "reconcile");
        assert_eq!(reports[1].1, IdentityError::Other("b".into()));
    }
}
