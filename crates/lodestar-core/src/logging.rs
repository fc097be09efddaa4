//! Bounded structured log sink.
//!
//! The [`Logger`] keeps the most recent entries in memory so the presentation
//! layer can show an output channel without reading log files. Every entry is
//! also forwarded to `tracing` at the same level.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default number of entries kept by a logger.
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Verbose diagnostics.
    Debug,
    /// Normal operation.
    Info,
    /// Something unexpected that did not stop the operation.
    Warn,
    /// An operation failed.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One recorded log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub level: LogLevel,
    /// Component that produced the entry (e.g., "pipeline.logging").
    pub source: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured payload.
    pub data: Option<Value>,
}

/// Append-only ring buffer of log entries.
///
/// When full, the oldest entry is evicted. Recording never fails.
pub struct Logger {
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl Logger {
    /// Creates a logger holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))) }
    }

    /// Maximum number of retained entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records a debug entry.
    pub fn debug(&self, message: impl Into<String>, source: &str, data: Option<Value>) {
        self.record(LogLevel::Debug, message.into(), source, data);
    }

    /// Records an info entry.
    pub fn info(&self, message: impl Into<String>, source: &str, data: Option<Value>) {
        self.record(LogLevel::Info, message.into(), source, data);
    }

    /// Records a warning entry.
    pub fn warn(&self, message: impl Into<String>, source: &str, data: Option<Value>) {
        self.record(LogLevel::Warn, message.into(), source, data);
    }

    /// Records an error entry.
    pub fn error(&self, message: impl Into<String>, source: &str, data: Option<Value>) {
        self.record(LogLevel::Error, message.into(), source, data);
    }

    /// Appends an entry at the given level.
    pub fn record(&self, level: LogLevel, message: String, source: &str, data: Option<Value>) {
        match level {
            LogLevel::Debug => tracing::debug!(source = %source, data = ?data, "{}", message),
            LogLevel::Info => tracing::info!(source = %source, data = ?data, "{}", message),
            LogLevel::Warn => tracing::warn!(source = %source, data = ?data, "{}", message),
            LogLevel::Error => tracing::error!(source = %source, data = ?data, "{}", message),
        }

        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            source: source.to_string(),
            message,
            data,
        };
        let mut entries = self.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Snapshot of all retained entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    /// Snapshot of the retained entries at exactly `level`.
    pub fn entries_at(&self, level: LogLevel) -> Vec<LogEntry> {
        self.lock().iter().filter(|e| e.level == level).cloned().collect()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no entries are retained.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops all retained entries.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
