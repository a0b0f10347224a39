//! Log domain types

use serde::{Deserialize, Serialize};

/// Severity of a per-job log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Formats a single log line as it is stored on the job
pub fn format_line(
    timestamp: chrono::DateTime<chrono::Utc>,
    level: LogLevel,
    message: &str,
) -> String {
    format!(
        "[{}] {:<7} {}\n",
        timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
        level.as_str(),
        message
    )
}
