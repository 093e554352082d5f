//! # Operation Log
//!
//! An append-only, timestamped record of every step of a run and every git
//! command it launched.
//!
//! Each entry is written to the log file as a single `"<timestamp> <message>\n"`
//! line with one `write_all` followed by a flush, so an interruption can at
//! worst truncate the entry being written, never an earlier one. Every entry
//! is mirrored to the `log` facade, which `env_logger` prints to stderr.
//!
//! Secrets registered with [`OperationLog::redact`] are replaced by their
//! masked form in every later entry, before the entry is written or mirrored.

use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::Result;
use crate::mask::Secret;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const FILE_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Severity of an entry, used for the mirrored `log` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// One recorded entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: String,
    pub severity: Severity,
    pub message: String,
}

impl LogEntry {
    /// The line this entry occupies in the log file, without the newline.
    pub fn line(&self) -> String {
        format!("{} {}", self.timestamp, self.message)
    }
}

struct Inner {
    file: Option<File>,
    entries: Vec<LogEntry>,
    secrets: Vec<Secret>,
}

/// Durable, append-only record of a run.
pub struct OperationLog {
    path: Option<PathBuf>,
    inner: Mutex<Inner>,
}

impl OperationLog {
    /// Open a new log file in `dir`, named after the current time.
    ///
    /// The file is `sync_<YYYYmmdd_HHMMSS>.log`; a second run within the same
    /// second appends to the same file.
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("sync_{}.log", Local::now().format(FILE_STAMP_FORMAT)));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path: Some(path),
            inner: Mutex::new(Inner {
                file: Some(file),
                entries: Vec::new(),
                secrets: Vec::new(),
            }),
        })
    }

    /// A log that only keeps entries in memory and mirrors them.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: Mutex::new(Inner {
                file: None,
                entries: Vec::new(),
                secrets: Vec::new(),
            }),
        }
    }

    /// Path of the log file, if this log is backed by one.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Mask every later occurrence of `secret` in recorded messages.
    pub fn redact(&self, secret: &Secret) {
        if !secret.is_empty() {
            self.lock().secrets.push(Secret::new(secret.expose()));
        }
    }

    /// Record a step.
    pub fn record(&self, message: impl AsRef<str>) {
        self.append(Severity::Info, message.as_ref());
    }

    /// Record a non-fatal problem.
    pub fn warn(&self, message: impl AsRef<str>) {
        self.append(Severity::Warn, message.as_ref());
    }

    /// Record a failure.
    pub fn error(&self, message: impl AsRef<str>) {
        self.append(Severity::Error, message.as_ref());
    }

    /// Snapshot of everything recorded so far, in order.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().entries.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock still holds a consistent entry list.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn append(&self, severity: Severity, message: &str) {
        let mut inner = self.lock();
        let mut message = single_line(message);
        for secret in &inner.secrets {
            if message.contains(secret.expose()) {
                message = message.replace(secret.expose(), &secret.masked());
            }
        }
        let entry = LogEntry {
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            severity,
            message,
        };

        match severity {
            Severity::Info => log::info!("{}", entry.message),
            Severity::Warn => log::warn!("{}", entry.message),
            Severity::Error => log::error!("{}", entry.message),
        }

        if let Some(file) = inner.file.as_mut() {
            let line = format!("{}\n", entry.line());
            if let Err(e) = file.write_all(line.as_bytes()).and_then(|()| file.flush()) {
                log::warn!("could not write to operation log: {}", e);
            }
        }
        inner.entries.push(entry);
    }
}

/// Collapse a multi-line message so one entry stays on one line.
fn single_line(message: &str) -> String {
    message
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}
