use std::{fmt, str::FromStr};

use crate::logger::error::LoggerError;

/// Where and how log records are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerFormat {
    /// Human-readable lines on stdout.
    Text,
    /// One JSON object per line, for log shippers.
    Json,
    /// The systemd journal.
    Journald,
}

impl LoggerFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            LoggerFormat::Text => "text",
            LoggerFormat::Json => "json",
            LoggerFormat::Journald => "journald",
        }
    }
}

impl fmt::Display for LoggerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoggerFormat {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let v = s.trim();
        if v.eq_ignore_ascii_case("text") {
            return Ok(LoggerFormat::Text);
        }
        if v.eq_ignore_ascii_case("json") {
            return Ok(LoggerFormat::Json);
        }
        if v.eq_ignore_ascii_case("journald") || v.eq_ignore_ascii_case("journal") {
            return if cfg!(all(target_os = "linux", feature = "journald")) {
                Ok(LoggerFormat::Journald)
            } else {
                Err(LoggerError::JournaldNotSupported)
            };
        }
        Err(LoggerError::InvalidFormat(s.to_string()))
    }
}
