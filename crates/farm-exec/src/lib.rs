//! Execution of a single job inside a worker process.
//!
//! A [`Task`] is created from one delivered message ([`Task::intake`]) and driven to a terminal
//! [`farm_model::TaskStatus`] by [`Task::run`], which races the callable against the soft and
//! hard watchdogs, acknowledges the message at most once and reports through [`TaskHooks`].

mod error;
pub use error::TaskError;

mod hooks;
pub use hooks::{NoHooks, TaskHooks, TaskInfo};

mod task;
pub use task::{Incoming, Task, TaskEnv, TaskReport};
