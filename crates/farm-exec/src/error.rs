use farm_core::CallError;
use thiserror::Error;

/// Why a task did not produce a result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("callable `{0}` is not registered")]
    Unresolvable(String),
    #[error("malformed job message: {0}")]
    Malformed(String),
    #[error(transparent)]
    Call(#[from] CallError),
}
