//! Core building blocks of the farm: configuration, the callable registry, the job codec,
//! acknowledgment guarding and task output capture.
//!
//! Nothing in this crate touches the broker directly; transport specifics are plugged in
//! through the [`Acker`] trait and by the `farm-broker` crate.

mod error;
pub use error::{ConfigError, CoreError};

pub mod config;
pub use config::FarmConfig;

mod timeouts;
pub use timeouts::Timeouts;

pub mod registry;
pub use registry::{Call, CallError, Callable, CallableRegistry, TaskContext};

pub mod codec;
pub use codec::{DecodedJob, EncodedJob, JobCodec, JobRequest};

mod ack;
pub use ack::{AckError, AckGuard, Acker};

pub mod capture;
pub use capture::OutputBuffer;

mod metrics;
pub use metrics::{MetricsBackend, MetricsHandle, NoopMetrics, ScaleDirection, noop_metrics};

mod system;
pub use system::{hostname, manager_id, pid, uptime_seconds, worker_id};
