//! AMQP plumbing of the farm, on top of `lapin`.
//!
//! Topology:
//! - a durable job queue shared by every worker
//! - a direct control exchange with three routing families:
//!   - `supervisor.{manager_id}`: worker → supervisor (heartbeats, stuck tasks)
//!   - `worker.{worker_id}`: supervisor → one worker (targeted shutdown)
//!   - `workers.{manager_id}`: supervisor → all its workers (broadcast shutdown, supervisor heartbeat)

mod error;
pub use error::BrokerError;

mod link;
pub use link::BrokerLink;

pub mod topology;

mod headers;
pub use headers::{job_properties, timeout_headers};

mod publisher;
pub use publisher::Publisher;

mod control;
pub use control::{ControlPublisher, ControlQueue};

mod ack;
pub use ack::{DeliveryAcker, requeue};

pub use lapin::message::Delivery;
