//! Messages exchanged between a supervisor and its workers over the control exchange.
//!
//! Every message is a JSON object discriminated by its `type` field.
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::{ManagerId, WireError, WorkerId, time_serde};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Worker → supervisor liveness report.
    Heartbeat(WorkerHeartbeat),
    /// Worker → supervisor: a task hit its hard timeout, the worker is about to exit.
    StuckTask(StuckTask),
    /// Supervisor → worker(s): stop consuming, drain for up to `grace_s`, exit.
    Shutdown { grace_s: u64 },
    /// Supervisor → workers liveness broadcast.
    SupervisorHeartbeat(SupervisorHeartbeat),
}

impl ControlMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(WireError::from)
    }

    pub fn from_bytes(body: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(body).map_err(WireError::from)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::Heartbeat(_) => "heartbeat",
            ControlMessage::StuckTask(_) => "stuck_task",
            ControlMessage::Shutdown { .. } => "shutdown",
            ControlMessage::SupervisorHeartbeat(_) => "supervisor_heartbeat",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerHeartbeat {
    pub worker_id: WorkerId,
    pub pid: u32,
    pub active_task_count: usize,
    #[serde(with = "time_serde")]
    pub start_timestamp: SystemTime,
    #[serde(with = "time_serde")]
    pub timestamp: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StuckTask {
    pub worker_id: WorkerId,
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(with = "time_serde")]
    pub start_timestamp: SystemTime,
    #[serde(with = "time_serde")]
    pub timestamp: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorHeartbeat {
    pub manager_id: ManagerId,
    #[serde(with = "time_serde")]
    pub timestamp: SystemTime,
}
