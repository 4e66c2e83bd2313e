//! Dashboard of a running supervisor.
//!
//! [`ApiHandler`] is the backend seam; [`SupervisorApiAdapter`] serves it from a
//! [`farm_runtime::SupervisorHandle`]. With the `http` feature, [`HttpApi`] mounts it on an axum
//! router:
//! - `GET /api/v1/farm` - farm snapshot
//! - `PUT /api/v1/farm/limits` - set min/max workers
//! - `POST /api/v1/farm/shutdown` - stop the farm
//! - `GET /metrics` - Prometheus text format

mod error;
pub use error::ApiError;

mod handler;
pub use handler::ApiHandler;

mod adapter;
pub use adapter::SupervisorApiAdapter;

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::{FarmStatusResponse, HttpApi, WorkerView};

#[cfg(feature = "http")]
pub use axum;
