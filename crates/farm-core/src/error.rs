use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("callable `{0}` cannot be resolved by a stable name")]
    UnresolvableCallable(String),
    #[error("anonymous callable `{0}` cannot be registered")]
    AnonymousCallable(String),
    #[error("callable `{0}` is already registered")]
    DuplicateCallable(String),
    #[error("payload too large: {size} bytes > limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("codec error: {0}")]
    Codec(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Codec(e.to_string())
    }
}

impl From<farm_model::WireError> for CoreError {
    fn from(e: farm_model::WireError) -> Self {
        CoreError::Codec(e.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Codec(e.to_string())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("min_workers ({min}) exceeds max_workers ({max})")]
    WorkerBounds { min: usize, max: usize },
}
