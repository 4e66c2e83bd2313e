mod job;
pub use job::JobMessage;

mod context;
pub use context::ContextSnapshot;

mod headers;
pub use headers::{HEADER_HARD_TIMEOUT, HEADER_SOFT_TIMEOUT, RawTimeoutHeaders};

mod output;
pub use output::{OutputEntry, OutputKind};

mod task_status;
pub use task_status::TaskStatus;

mod worker_info;
pub use worker_info::{FarmLimits, FarmSnapshot, WorkerInfo};

/// Identifier of a single task execution inside a worker process.
///
/// Derived from the worker pid and the broker delivery tag (`"{pid}_{tag}"`).
pub type TaskId = String;

/// Identifier of a worker process (`"worker_{pid}_{start_unix_s}"`).
pub type WorkerId = String;

/// Identifier of a supervisor, shared with every worker it spawns (`"manager_{pid}_{start_unix_s}"`).
pub type ManagerId = String;
