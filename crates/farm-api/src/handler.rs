use async_trait::async_trait;
use farm_model::{FarmLimits, FarmSnapshot};

use crate::error::ApiError;

/// Dashboard backend.
///
/// [`crate::SupervisorApiAdapter`] covers the common case; custom handlers can wrap it with
/// extra logic (auth, audit).
#[async_trait]
pub trait ApiHandler: Send + Sync + 'static {
    /// Current state of the farm.
    async fn farm_status(&self) -> Result<FarmSnapshot, ApiError>;

    /// Replaces the scaling bounds; returns the bounds now in effect.
    async fn set_limits(&self, limits: FarmLimits) -> Result<FarmLimits, ApiError>;

    /// Asks the supervisor to stop the farm.
    async fn request_shutdown(&self) -> Result<(), ApiError>;

    /// Metrics in Prometheus text format.
    async fn metrics_text(&self) -> Result<String, ApiError>;
}
