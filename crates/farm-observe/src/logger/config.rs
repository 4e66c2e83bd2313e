use std::io::IsTerminal;

use crate::logger::{error::LoggerError, format::LoggerFormat};

pub const ENV_LOG_LEVEL: &str = "FARM_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "FARM_LOG_FORMAT";

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
    /// Route log records emitted inside a task span into that task's output buffer.
    pub capture_task_output: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        let use_color = cfg!(test) || std::io::stdout().is_terminal();
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color,
            capture_task_output: true,
        }
    }
}

impl LoggerConfig {
    /// Reads `FARM_LOG_LEVEL` and `FARM_LOG_FORMAT`.
    pub fn from_env() -> Result<Self, LoggerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, LoggerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.trim().is_empty()) {
            cfg.level = level;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT).filter(|v| !v.trim().is_empty()) {
            cfg.format = format.parse()?;
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_level_and_format() {
        let cfg = LoggerConfig::from_lookup(|k| match k {
            ENV_LOG_LEVEL => Some("debug,lapin=warn".into()),
            ENV_LOG_FORMAT => Some("JSON".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.level, "debug,lapin=warn");
        assert_eq!(cfg.format, LoggerFormat::Json);
    }

    #[test]
    fn unknown_format_is_rejected() {
        let err = LoggerConfig::from_lookup(|k| (k == ENV_LOG_FORMAT).then(|| "xml".into())).unwrap_err();
        assert!(matches!(err, LoggerError::InvalidFormat(f) if f == "xml"));
    }
}
