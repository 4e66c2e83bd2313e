use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use farm_core::{OutputBuffer, Timeouts};
use farm_model::TaskStatus;
use serde_json::Value;

use crate::TaskError;

/// Task state handed to hooks.
#[derive(Clone, Debug)]
pub struct TaskInfo {
    pub task_id: String,
    pub callable_reference: String,
    pub status: TaskStatus,
    pub timeouts: Timeouts,
    pub started_at: SystemTime,
    pub elapsed: Duration,
    /// Output captured so far.
    pub output: OutputBuffer,
}

/// Lifecycle callbacks of a task.
///
/// Ordering:
/// - success / failure: ack → `on_done` → `on_success` | `on_failure`
/// - soft timeout: ack → `on_soft_timeout`, then `on_done` once the task settles
///   (`on_soft_timeout` runs alongside the hard watchdog and is detached if the hard timeout
///   fires first)
/// - hard timeout: ack → `on_hard_timeout` → `on_done`
///
/// A hook that panics is logged and otherwise ignored.
#[async_trait]
pub trait TaskHooks: Send + Sync + 'static {
    async fn on_success(&self, _task: &TaskInfo, _result: &Value) {}
    async fn on_failure(&self, _task: &TaskInfo, _error: &TaskError) {}
    async fn on_soft_timeout(&self, _task: &TaskInfo) {}
    async fn on_hard_timeout(&self, _task: &TaskInfo) {}
    async fn on_done(&self, _task: &TaskInfo) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl TaskHooks for NoHooks {}

/// Hooks run in order.
#[async_trait]
impl TaskHooks for Vec<std::sync::Arc<dyn TaskHooks>> {
    async fn on_success(&self, task: &TaskInfo, result: &Value) {
        for h in self {
            h.on_success(task, result).await;
        }
    }

    async fn on_failure(&self, task: &TaskInfo, error: &TaskError) {
        for h in self {
            h.on_failure(task, error).await;
        }
    }

    async fn on_soft_timeout(&self, task: &TaskInfo) {
        for h in self {
            h.on_soft_timeout(task).await;
        }
    }

    async fn on_hard_timeout(&self, task: &TaskInfo) {
        for h in self {
            h.on_hard_timeout(task).await;
        }
    }

    async fn on_done(&self, task: &TaskInfo) {
        for h in self {
            h.on_done(task).await;
        }
    }
}
