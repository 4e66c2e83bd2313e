//! Wire and domain types shared by every farm component.
//!
//! Nothing here talks to the broker or spawns anything: the crate only describes what travels
//! on the job queue and the control exchange, plus the small vocabulary used to report on tasks
//! and workers.

mod domain;
pub use domain::*;

mod control;
pub use control::{ControlMessage, StuckTask, SupervisorHeartbeat, WorkerHeartbeat};

mod wire;
pub use wire::{WireError, time_serde};
