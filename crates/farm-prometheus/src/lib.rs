//! Prometheus metrics backend for the farm supervisor.
//!
//! [`PrometheusMetrics`] implements [`farm_core::MetricsBackend`]; hand it to the supervisor and
//! expose [`PrometheusMetrics::gather`] (or `export_text` through the trait) over HTTP.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use farm_core::{MetricsBackend, MetricsHandle};
//! use farm_prometheus::PrometheusMetrics;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::new()?;
//! let handle: MetricsHandle = Arc::new(metrics.clone());
//!
//! handle.record_queue_depth(12);
//! assert!(handle.export_text().unwrap_or_default().contains("farm_queue_depth 12"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `farm_workers` - Gauge, tracked worker processes
//! - `farm_pending_workers` - Gauge, spawned processes not yet heard from
//! - `farm_queue_depth` - Gauge, last observed job queue depth
//! - `farm_scale_events_total{direction}` - Counter, workers added (`up`) or retired (`down`)
//! - `farm_stuck_tasks_total` - Counter
//! - `farm_heartbeats_total` - Counter

mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
