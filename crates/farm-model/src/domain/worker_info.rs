use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::{ManagerId, WorkerId, time_serde};

/// Point-in-time view of one tracked worker, as seen by the supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub worker_id: WorkerId,
    pub pid: u32,
    pub active_tasks: usize,
    #[serde(with = "time_serde")]
    pub last_heartbeat: SystemTime,
    #[serde(with = "time_serde")]
    pub started_at: SystemTime,
}

/// Scaling bounds of a farm. Adjustable at runtime from the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmLimits {
    pub min_workers: usize,
    pub max_workers: usize,
}

impl FarmLimits {
    /// Returns a description of the problem when the bounds are unusable.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_workers == 0 {
            return Err("max_workers must be at least 1".into());
        }
        if self.min_workers > self.max_workers {
            return Err(format!(
                "min_workers ({}) must not exceed max_workers ({})",
                self.min_workers, self.max_workers
            ));
        }
        Ok(())
    }
}

/// Read-only snapshot of a running supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarmSnapshot {
    pub manager_id: ManagerId,
    pub workers: Vec<WorkerInfo>,
    /// Spawned processes that have not sent their first heartbeat yet.
    pub pending: usize,
    pub limits: FarmLimits,
    /// Queue depth seen by the last successful scaling tick.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_depth: Option<u32>,
    /// `(tracked + pending) × prefetch_per_worker`.
    pub capacity: usize,
    pub shutdown_requested: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_validation() {
        assert!(FarmLimits { min_workers: 1, max_workers: 3 }.validate().is_ok());
        assert!(FarmLimits { min_workers: 3, max_workers: 3 }.validate().is_ok());
        assert!(FarmLimits { min_workers: 0, max_workers: 0 }.validate().is_err());
        assert!(FarmLimits { min_workers: 4, max_workers: 3 }.validate().is_err());
    }
}
