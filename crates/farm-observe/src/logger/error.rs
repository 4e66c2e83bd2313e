use thiserror::Error;

/// Failures while setting up `farmd` logging.
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("FARM_LOG_FORMAT={0:?} is not one of text, json, journald")]
    InvalidFormat(String),
    #[error("journald output needs Linux and the `journald` feature")]
    JournaldNotSupported,
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
    #[error("logger setup failed: {0}")]
    InitializationFailed(String),
    #[error("FARM_LOG_LEVEL={0:?} is not a valid filter directive")]
    InvalidLogLevel(String),
}
