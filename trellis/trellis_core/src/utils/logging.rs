//! Logging and diagnostics.
//!
//! The framework reports its own internal failures (a listener that failed,
//! an activator that failed while the framework was shutting down) through
//! the [`Diagnostics`] trait. The framework calls it unconditionally; whether
//! anything is printed is decided by the sink and by the process-wide
//! minimum level set with [`set_log_level`].

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

/// Log level.
///
/// Ordered by increasing severity: `Debug < Info < Warning < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debug information.
    Debug,

    /// Informational messages.
    Info,

    /// Warning messages.
    Warning,

    /// Error messages.
    Error,
}

impl LogLevel {
    /// Get the name of this log level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    /// Get the numeric value of this log level. Higher is more severe.
    pub fn as_number(&self) -> u8 {
        match self {
            Self::Debug => 0,
            Self::Info => 1,
            Self::Warning => 2,
            Self::Error => 3,
        }
    }

    fn from_number(value: u8) -> Self {
        match value {
            0 => Self::Debug,
            1 => Self::Info,
            2 => Self::Warning,
            _ => Self::Error,
        }
    }

    /// Check if this log level is at least as severe as the given level.
    pub fn is_at_least(&self, level: LogLevel) -> bool {
        self.as_number() >= level.as_number()
    }
}

impl FromStr for LogLevel {
    type Err = ();

    /// Parse a level name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" | "err" => Ok(Self::Error),
            _ => Err(()),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static MINIMUM_LEVEL: AtomicU8 = AtomicU8::new(0);

/// Set the process-wide minimum level.
///
/// Messages below this level are discarded by every sink that uses the
/// default [`Diagnostics::enabled`]. E.g. a level of `Warning` discards all
/// `Debug` and `Info` messages.
pub fn set_log_level(level: LogLevel) {
    MINIMUM_LEVEL.store(level.as_number(), Ordering::Relaxed);
}

/// Get the process-wide minimum level. Defaults to `Debug`.
pub fn log_level() -> LogLevel {
    LogLevel::from_number(MINIMUM_LEVEL.load(Ordering::Relaxed))
}

/// A log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// The log level.
    pub level: LogLevel,

    /// The log message.
    pub message: String,

    /// The module path where the log was recorded.
    pub module_path: String,

    /// The timestamp when the log was recorded.
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Additional metadata.
    pub metadata: std::collections::HashMap<String, String>,
}

impl LogRecord {
    /// Create a new log record stamped with the current time.
    pub fn new(level: LogLevel, message: impl Into<String>, module_path: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            module_path: module_path.into(),
            timestamp: chrono::Utc::now(),
            metadata: std::collections::HashMap::new(),
        }
    }

    /// Add metadata to this log record.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The message followed by the metadata as sorted `key=value` pairs.
    pub fn describe(&self) -> String {
        if self.metadata.is_empty() {
            return self.message.clone();
        }

        let mut pairs: Vec<_> = self
            .metadata
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        pairs.sort();
        format!("{} - {}", self.message, pairs.join(" "))
    }

    /// Format this log record for display.
    pub fn format(&self) -> String {
        format!(
            "{} [{}] - {} [{}]",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level,
            self.describe(),
            self.module_path,
        )
    }
}

/// Sink for framework-internal diagnostics.
pub trait Diagnostics: Send + Sync {
    /// Accept one message.
    fn message(&self, level: LogLevel, message: &str);

    /// Accept a structured record. Sinks without a use for the metadata
    /// receive it folded into the message.
    fn record(&self, record: LogRecord) {
        if self.enabled(record.level) {
            self.message(record.level, &record.describe());
        }
    }

    /// Check if messages at `level` would be kept.
    fn enabled(&self, level: LogLevel) -> bool {
        level.is_at_least(log_level())
    }
}

/// Forwards diagnostics to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn message(&self, level: LogLevel, message: &str) {
        if self.enabled(level) {
            crate::log_event!(level, message);
        }
    }
}

/// Keeps diagnostics in memory.
///
/// Useful for embedders that surface framework failures in their own UI,
/// and for tests asserting that a failure was reported.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    records: Mutex<Vec<LogRecord>>,
}

impl RecordingDiagnostics {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<LogRecord> {
        std::mem::take(&mut *self.records.lock())
    }

    /// Check if a message at `level` containing `needle` was recorded.
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.records
            .lock()
            .iter()
            .any(|r| r.level == level && r.message.contains(needle))
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn message(&self, level: LogLevel, message: &str) {
        self.record(LogRecord::new(level, message, module_path!()));
    }

    fn record(&self, record: LogRecord) {
        if self.enabled(record.level) {
            self.records.lock().push(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Error > LogLevel::Warning);
        assert!(LogLevel::Warning > LogLevel::Info);
        assert!(LogLevel::Info > LogLevel::Debug);
    }

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("Warning".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("err".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_level_is_at_least() {
        assert!(LogLevel::Error.is_at_least(LogLevel::Debug));
        assert!(LogLevel::Warning.is_at_least(LogLevel::Warning));
        assert!(!LogLevel::Info.is_at_least(LogLevel::Warning));
    }

    #[test]
    fn test_threshold_filters_recording() {
        let previous = log_level();
        let recorder = RecordingDiagnostics::new();

        set_log_level(LogLevel::Error);
        assert_eq!(log_level(), LogLevel::Error);
        recorder.message(LogLevel::Warning, "dropped");
        recorder.message(LogLevel::Error, "kept");

        set_log_level(previous);

        let records = recorder.take();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "kept");
        assert!(recorder.records().is_empty());
    }

    #[test]
    fn test_recording_contains() {
        let recorder = RecordingDiagnostics::new();
        recorder.message(LogLevel::Error, "listener 4 failed: boom");
        assert!(recorder.contains(LogLevel::Error, "boom"));
        assert!(!recorder.contains(LogLevel::Warning, "boom"));
    }

    #[test]
    fn test_log_record_format() {
        let record = LogRecord::new(LogLevel::Info, "Bundle started", "trellis::bundle")
            .with_metadata("bundle", "3")
            .with_metadata("state", "ACTIVE");
        let formatted = record.format();
        assert!(formatted.contains("[INFO]"));
        assert!(formatted.contains("Bundle started"));
        assert!(formatted.contains("bundle=3 state=ACTIVE"));
    }

    #[test]
    fn test_records_keep_their_metadata() {
        let recorder = RecordingDiagnostics::new();
        recorder.record(
            LogRecord::new(LogLevel::Error, "Listener failed", "trellis::event")
                .with_metadata("listener", "7"),
        );

        let records = recorder.take();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].module_path, "trellis::event");
        assert_eq!(records[0].metadata.get("listener").map(String::as_str), Some("7"));
        assert_eq!(records[0].describe(), "Listener failed - listener=7");
    }

    /// Sink implementing only `message`.
    #[derive(Default)]
    struct Plain(Mutex<Vec<String>>);

    impl Diagnostics for Plain {
        fn message(&self, _level: LogLevel, message: &str) {
            self.0.lock().push(message.to_string());
        }
    }

    #[test]
    fn test_default_record_folds_metadata_into_message() {
        let sink = Plain::default();
        sink.record(
            LogRecord::new(LogLevel::Error, "Listener failed", "trellis::event")
                .with_metadata("service", "12")
                .with_metadata("listener", "7"),
        );
        assert_eq!(*sink.0.lock(), vec!["Listener failed - listener=7 service=12".to_string()]);
    }

    #[test]
    fn test_log_level_serialization() {
        let serialized = serde_json::to_string(&LogLevel::Warning).unwrap();
        assert_eq!(serialized, "\"warning\"");
        let deserialized: LogLevel = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, LogLevel::Warning);
    }
}
