use async_trait::async_trait;
use farm_model::{FarmLimits, FarmSnapshot};
use farm_runtime::SupervisorHandle;

use crate::error::ApiError;
use crate::handler::ApiHandler;

/// Serves the dashboard straight from a supervisor handle.
pub struct SupervisorApiAdapter {
    supervisor: SupervisorHandle,
}

impl SupervisorApiAdapter {
    pub fn new(supervisor: SupervisorHandle) -> Self {
        Self { supervisor }
    }
}

#[async_trait]
impl ApiHandler for SupervisorApiAdapter {
    async fn farm_status(&self) -> Result<FarmSnapshot, ApiError> {
        Ok(self.supervisor.snapshot())
    }

    async fn set_limits(&self, limits: FarmLimits) -> Result<FarmLimits, ApiError> {
        self.supervisor
            .set_limits(limits)
            .map_err(ApiError::InvalidRequest)
    }

    async fn request_shutdown(&self) -> Result<(), ApiError> {
        self.supervisor.request_shutdown();
        Ok(())
    }

    async fn metrics_text(&self) -> Result<String, ApiError> {
        self.supervisor
            .metrics()
            .export_text()
            .ok_or_else(|| ApiError::Unavailable("no metrics backend configured".into()))
    }
}
