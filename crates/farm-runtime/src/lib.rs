//! Long-running processes of the farm: the [`Worker`] consuming jobs and the [`Supervisor`]
//! owning a pool of worker processes.

mod error;
pub use error::RuntimeError;

mod signals;
pub use signals::wait_for_shutdown_signal;

pub mod worker;
pub use worker::{Worker, WorkerExit, abandon_and_exit};

pub mod supervisor;
pub use supervisor::{ExeSpawner, Supervisor, SupervisorHandle};
