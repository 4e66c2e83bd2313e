use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AckError {
    #[error("ack transport failed: {0}")]
    Transport(String),
}

/// Acknowledges one delivered message with the broker.
#[async_trait]
pub trait Acker: Send + Sync + 'static {
    async fn ack(&self) -> Result<(), AckError>;
}

/// Ensures a message is acknowledged at most once.
///
/// The task body, both watchdogs and the failure paths race to acknowledge; the first caller
/// wins and later calls are no-ops. A transport failure releases the guard so a later caller
/// can try again.
pub struct AckGuard {
    task_id: String,
    acker: Arc<dyn Acker>,
    acked: AtomicBool,
}

impl AckGuard {
    pub fn new(task_id: impl Into<String>, acker: Arc<dyn Acker>) -> Self {
        Self {
            task_id: task_id.into(),
            acker,
            acked: AtomicBool::new(false),
        }
    }

    /// Acknowledges the message; returns `true` if this call performed the ack.
    pub async fn ack(&self) -> Result<bool, AckError> {
        if self
            .acked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(false);
        }
        match self.acker.ack().await {
            Ok(()) => {
                debug!(target: "farm.core.ack", task_id = %self.task_id, "message acknowledged");
                Ok(true)
            }
            Err(e) => {
                self.acked.store(false, Ordering::Release);
                warn!(target: "farm.core.ack", task_id = %self.task_id, error = %e, "ack failed");
                Err(e)
            }
        }
    }

    #[inline]
    pub fn is_acked(&self) -> bool {
        self.acked.load(Ordering::Acquire)
    }

    #[inline]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}
