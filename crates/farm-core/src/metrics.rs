use std::{fmt, sync::Arc};

/// Direction of a scaling decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScaleDirection {
    Up,
    Down,
}

impl ScaleDirection {
    pub fn as_label(&self) -> &'static str {
        match self {
            ScaleDirection::Up => "up",
            ScaleDirection::Down => "down",
        }
    }
}

impl fmt::Display for ScaleDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Sink for farm metrics. Every method defaults to a no-op.
pub trait MetricsBackend: Send + Sync + 'static {
    /// Current number of tracked and pending worker processes.
    fn record_workers(&self, _tracked: usize, _pending: usize) {}

    /// Last observed depth of the job queue.
    fn record_queue_depth(&self, _depth: u32) {}

    /// `count` workers spawned or retired by one scaling decision.
    fn record_scale(&self, _direction: ScaleDirection, _count: usize) {}

    /// A worker reported a task past its hard timeout.
    fn record_stuck_task(&self) {}

    /// A worker heartbeat was received.
    fn record_heartbeat(&self) {}

    /// Text exposition of the collected metrics, if the backend has one.
    fn export_text(&self) -> Option<String> {
        None
    }
}

pub type MetricsHandle = Arc<dyn MetricsBackend>;

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsBackend for NoopMetrics {}

pub fn noop_metrics() -> MetricsHandle {
    Arc::new(NoopMetrics)
}
