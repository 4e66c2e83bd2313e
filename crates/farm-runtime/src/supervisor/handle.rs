use std::sync::{Arc, Mutex, PoisonError, RwLock};

use farm_core::MetricsHandle;
use farm_model::{FarmLimits, FarmSnapshot};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::table::WorkerTable;

/// Shared view of a running supervisor, handed to the dashboard.
#[derive(Clone)]
pub struct SupervisorHandle {
    inner: Arc<Shared>,
}

struct Shared {
    manager_id: String,
    prefetch: usize,
    limits: RwLock<FarmLimits>,
    queue_depth: RwLock<Option<u32>>,
    table: Mutex<WorkerTable>,
    shutdown: CancellationToken,
    metrics: MetricsHandle,
}

impl SupervisorHandle {
    pub(crate) fn new(manager_id: String, limits: FarmLimits, prefetch: usize, metrics: MetricsHandle) -> Self {
        Self {
            inner: Arc::new(Shared {
                manager_id,
                prefetch: prefetch.max(1),
                limits: RwLock::new(limits),
                queue_depth: RwLock::new(None),
                table: Mutex::new(WorkerTable::new()),
                shutdown: CancellationToken::new(),
                metrics,
            }),
        }
    }

    #[inline]
    pub fn manager_id(&self) -> &str {
        &self.inner.manager_id
    }

    #[inline]
    pub fn prefetch(&self) -> usize {
        self.inner.prefetch
    }

    pub fn limits(&self) -> FarmLimits {
        *self.inner.limits.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the scaling bounds; they apply from the next scaling check.
    pub fn set_limits(&self, limits: FarmLimits) -> Result<FarmLimits, String> {
        limits.validate()?;
        *self.inner.limits.write().unwrap_or_else(PoisonError::into_inner) = limits;
        info!(
            target: "farm.supervisor",
            min_workers = limits.min_workers,
            max_workers = limits.max_workers,
            "limits updated"
        );
        Ok(limits)
    }

    /// Last queue depth observed by the scaling loop.
    pub fn queue_depth(&self) -> Option<u32> {
        *self.inner.queue_depth.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_queue_depth(&self, depth: u32) {
        *self.inner.queue_depth.write().unwrap_or_else(PoisonError::into_inner) = Some(depth);
        self.inner.metrics.record_queue_depth(depth);
    }

    pub fn snapshot(&self) -> FarmSnapshot {
        let (workers, pending, current) = self.with_table(|t| (t.workers(), t.pending_len(), t.current()));
        FarmSnapshot {
            manager_id: self.inner.manager_id.clone(),
            workers,
            pending,
            limits: self.limits(),
            queue_depth: self.queue_depth(),
            capacity: current * self.inner.prefetch,
            shutdown_requested: self.is_shutdown_requested(),
        }
    }

    /// Asks the supervisor to stop the farm; idempotent.
    pub fn request_shutdown(&self) {
        if !self.inner.shutdown.is_cancelled() {
            info!(target: "farm.supervisor", "farm shutdown requested");
            self.inner.shutdown.cancel();
        }
    }

    #[inline]
    pub fn is_shutdown_requested(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    #[inline]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    #[inline]
    pub fn metrics(&self) -> &MetricsHandle {
        &self.inner.metrics
    }

    pub(crate) fn with_table<R>(&self, f: impl FnOnce(&mut WorkerTable) -> R) -> R {
        let mut table = self.inner.table.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut table)
    }

    pub(crate) fn record_workers(&self) {
        let (tracked, pending) = self.with_table(|t| (t.tracked_len(), t.pending_len()));
        self.inner.metrics.record_workers(tracked, pending);
    }
}
