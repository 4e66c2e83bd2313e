use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

/// Number of tasks currently running in this worker.
#[derive(Clone, Debug, Default)]
pub struct ActiveTasks(Arc<AtomicUsize>);

impl ActiveTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one more running task until the returned slot is dropped.
    pub fn acquire(&self) -> ActiveSlot {
        self.0.fetch_add(1, Ordering::AcqRel);
        ActiveSlot(self.0.clone())
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.count() == 0
    }
}

#[must_use]
#[derive(Debug)]
pub struct ActiveSlot(Arc<AtomicUsize>);

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_track_running_tasks() {
        let active = ActiveTasks::new();
        let a = active.acquire();
        let b = active.acquire();
        assert_eq!(active.count(), 2);

        drop(a);
        assert_eq!(active.count(), 1);
        drop(b);
        assert!(active.is_idle());
    }
}
