use async_trait::async_trait;
use farm_exec::{TaskError, TaskHooks, TaskInfo};
use farm_model::TaskStatus;
use serde_json::Value;
use tracing::{debug, error, info, warn};

/// Writes every task lifecycle event to the process log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskJournal;

#[async_trait]
impl TaskHooks for TaskJournal {
    async fn on_success(&self, task: &TaskInfo, _result: &Value) {
        info!(target: "farm.task", task_id = %task.task_id, callable = %task.callable_reference, elapsed_ms = task.elapsed.as_millis() as u64, "{}", message_for(task.status));
    }

    async fn on_failure(&self, task: &TaskInfo, error: &TaskError) {
        warn!(target: "farm.task", task_id = %task.task_id, callable = %task.callable_reference, error = %error, "{}", message_for(task.status));
    }

    async fn on_soft_timeout(&self, task: &TaskInfo) {
        warn!(target: "farm.task", task_id = %task.task_id, callable = %task.callable_reference, timeout = ?task.timeouts.soft(), "{}", message_for(task.status));
    }

    async fn on_hard_timeout(&self, task: &TaskInfo) {
        error!(target: "farm.task", task_id = %task.task_id, callable = %task.callable_reference, timeout = ?task.timeouts.hard(), "{}", message_for(task.status));
    }

    async fn on_done(&self, task: &TaskInfo) {
        debug!(target: "farm.task", task_id = %task.task_id, status = task.status.as_str(), captured = task.output.len(), "task done");
    }
}

#[inline]
pub fn message_for(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "task received",
        TaskStatus::Running => "task is running",
        TaskStatus::Success => "task succeeded",
        TaskStatus::Failure => "task failed (acknowledged, not retried)",
        TaskStatus::SoftTimeout => "soft timeout reached; cancellation requested",
        TaskStatus::HardTimeout => "hard timeout reached; task is stuck",
    }
}
