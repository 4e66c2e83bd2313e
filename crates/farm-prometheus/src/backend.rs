use farm_core::{MetricsBackend, ScaleDirection};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::warn;

#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    workers: IntGauge,
    pending_workers: IntGauge,
    queue_depth: IntGauge,
    scale_events: IntCounterVec,
    stuck_tasks: IntCounter,
    heartbeats: IntCounter,
}

impl PrometheusMetrics {
    /// Registers the farm metrics in a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Registers the farm metrics in `registry`.
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let workers = IntGauge::new("farm_workers", "Tracked worker processes")?;
        let pending_workers = IntGauge::new(
            "farm_pending_workers",
            "Spawned worker processes that have not sent a heartbeat yet",
        )?;
        let queue_depth = IntGauge::new("farm_queue_depth", "Last observed depth of the job queue")?;
        let scale_events = IntCounterVec::new(
            Opts::new("farm_scale_events_total", "Workers added or retired by scaling"),
            &["direction"],
        )?;
        let stuck_tasks = IntCounter::new(
            "farm_stuck_tasks_total",
            "Tasks reported past their hard timeout",
        )?;
        let heartbeats = IntCounter::new("farm_heartbeats_total", "Worker heartbeats received")?;

        registry.register(Box::new(workers.clone()))?;
        registry.register(Box::new(pending_workers.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(scale_events.clone()))?;
        registry.register(Box::new(stuck_tasks.clone()))?;
        registry.register(Box::new(heartbeats.clone()))?;

        Ok(Self {
            registry,
            workers,
            pending_workers,
            queue_depth,
            scale_events,
            stuck_tasks,
            heartbeats,
        })
    }

    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Text exposition format of every registered metric.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn record_workers(&self, tracked: usize, pending: usize) {
        self.workers.set(tracked as i64);
        self.pending_workers.set(pending as i64);
    }

    fn record_queue_depth(&self, depth: u32) {
        self.queue_depth.set(i64::from(depth));
    }

    fn record_scale(&self, direction: ScaleDirection, count: usize) {
        self.scale_events
            .with_label_values(&[direction.as_label()])
            .inc_by(count as u64);
    }

    fn record_stuck_task(&self) {
        self.stuck_tasks.inc();
    }

    fn record_heartbeat(&self) {
        self.heartbeats.inc();
    }

    fn export_text(&self) -> Option<String> {
        match self.encode() {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(target: "farm.metrics", error = %e, "metrics encoding failed");
                None
            }
        }
    }
}
