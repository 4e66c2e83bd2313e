use std::{fmt, time::SystemTime};

use serde::{Deserialize, Serialize};

use crate::time_serde;

/// Origin of a captured output line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    ConsoleOut,
    ConsoleErr,
    LogRecord,
}

impl OutputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputKind::ConsoleOut => "stdout",
            OutputKind::ConsoleErr => "stderr",
            OutputKind::LogRecord => "log",
        }
    }
}

/// One captured line of task output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputEntry {
    pub kind: OutputKind,
    #[serde(with = "time_serde")]
    pub timestamp: SystemTime,
    /// Log level for [`OutputKind::LogRecord`] entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    pub text: String,
}

impl OutputEntry {
    pub fn console_out(text: impl Into<String>) -> Self {
        Self::now(OutputKind::ConsoleOut, None, text.into())
    }

    pub fn console_err(text: impl Into<String>) -> Self {
        Self::now(OutputKind::ConsoleErr, None, text.into())
    }

    pub fn log_record(level: impl Into<String>, text: impl Into<String>) -> Self {
        Self::now(OutputKind::LogRecord, Some(level.into()), text.into())
    }

    fn now(kind: OutputKind, level: Option<String>, text: String) -> Self {
        Self {
            kind,
            timestamp: SystemTime::now(),
            level,
            text,
        }
    }
}

impl fmt::Display for OutputEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.level {
            Some(level) => write!(f, "[{}:{}] {}", self.kind.as_str(), level, self.text),
            None => write!(f, "[{}] {}", self.kind.as_str(), self.text),
        }
    }
}
