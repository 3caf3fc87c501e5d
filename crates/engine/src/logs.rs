//! Task log capture and replay
//!
//! Messages a task logs during `run` are emitted through `tracing` right away
//! and also recorded. The records are stored next to the cached result and
//! replayed, prefixed with `[CACHED <timestamp>]`, whenever that result is
//! reused, so a cache hit reads like the original execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Suffix appended to a result key to form the key of its log records
pub const LOGS_KEY_SUFFIX: &str = "_logs";

/// Severity of a task log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Very fine-grained detail
    Trace,
    /// Debug information
    Debug,
    /// Normal progress
    Info,
    /// Something unexpected but recoverable
    Warn,
    /// A failure
    Error,
}

/// One message logged by a task during `run`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Severity
    pub level: LogLevel,
    /// Message text
    pub message: String,
    /// When the message was logged
    pub timestamp: DateTime<Utc>,
}

impl LogRecord {
    /// Record a message now
    #[must_use]
    pub fn now(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Message text as shown when replayed from the cache
    #[must_use]
    pub fn cached_message(&self) -> String {
        format!(
            "[CACHED {}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.message
        )
    }
}

/// Emit a task message at `level`
pub fn emit(task: &str, level: LogLevel, message: &str) {
    match level {
        LogLevel::Trace => tracing::trace!(target: "tessera::task", task = %task, "{message}"),
        LogLevel::Debug => tracing::debug!(target: "tessera::task", task = %task, "{message}"),
        LogLevel::Info => tracing::info!(target: "tessera::task", task = %task, "{message}"),
        LogLevel::Warn => tracing::warn!(target: "tessera::task", task = %task, "{message}"),
        LogLevel::Error => tracing::error!(target: "tessera::task", task = %task, "{message}"),
    }
}

/// Re-emit stored records of a reused result
pub fn replay(task: &str, records: &[LogRecord]) {
    for record in records {
        emit(task, record.level, &record.cached_message());
    }
}

/// Key under which the records for `result_key` are stored
#[must_use]
pub fn logs_key(result_key: &str) -> String {
    format!("{result_key}{LOGS_KEY_SUFFIX}")
}

/// Whether a stored key holds log records rather than a result
#[must_use]
pub fn is_logs_key(key: &str) -> bool {
    key.ends_with(LOGS_KEY_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cached_message_has_prefix_and_timestamp() {
        let record = LogRecord {
            level: LogLevel::Info,
            message: "built 3 cells".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
        };
        assert_eq!(
            record.cached_message(),
            "[CACHED 2024-05-01 12:30:00] built 3 cells"
        );
    }

    #[test]
    fn logs_keys() {
        assert_eq!(logs_key("Task_abc"), "Task_abc_logs");
        assert!(is_logs_key("Task_abc_logs"));
        assert!(!is_logs_key("Task_abc"));
    }

    #[test]
    fn level_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), r#""warn""#);
    }
}
