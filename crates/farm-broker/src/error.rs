use farm_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("broker error: {0}")]
    Amqp(#[from] lapin::Error),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("malformed control message: {0}")]
    Malformed(String),
    #[error("broker rejected the message")]
    Nacked,
    #[error("consumer stream closed")]
    Closed,
}

impl From<farm_model::WireError> for BrokerError {
    fn from(e: farm_model::WireError) -> Self {
        BrokerError::Malformed(e.to_string())
    }
}
