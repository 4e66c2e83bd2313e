//! # Per-task output capture.
//!
//! Each task owns an [`OutputBuffer`], a bounded ring of [`OutputEntry`] values. Console lines
//! are written through [`crate::TaskContext`]; log records are routed by the tracing layer in
//! `farm-observe`, which finds the buffer through the task span.
//!
//! The span carrying a task is named [`TASK_SPAN_NAME`] and records the task id in the
//! [`TASK_ID_FIELD`] field. Buffers are published in a process-wide hub for the duration of
//! the task via [`register`]; the returned [`Registration`] removes the entry on drop.
use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::{Arc, Mutex, OnceLock, PoisonError, RwLock},
};

use farm_model::OutputEntry;

pub const TASK_SPAN_NAME: &str = "farm_task";
pub const TASK_ID_FIELD: &str = "task_id";

struct Ring {
    entries: VecDeque<OutputEntry>,
    capacity: usize,
    dropped: u64,
}

/// Bounded buffer of captured output; the oldest entries are evicted first.
#[derive(Clone)]
pub struct OutputBuffer {
    inner: Arc<Mutex<Ring>>,
}

impl OutputBuffer {
    /// Capacity is clamped to at least one entry.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(Ring {
                entries: VecDeque::with_capacity(capacity.min(1024)),
                capacity,
                dropped: 0,
            })),
        }
    }

    pub fn push(&self, entry: OutputEntry) {
        let mut ring = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if ring.entries.len() == ring.capacity {
            ring.entries.pop_front();
            ring.dropped += 1;
        }
        ring.entries.push_back(entry);
    }

    /// Snapshot of the retained entries, oldest first.
    pub fn entries(&self) -> Vec<OutputEntry> {
        let ring = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        ring.entries.iter().cloned().collect()
    }

    /// Retained entries rendered one per line.
    pub fn text(&self) -> String {
        let ring = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        ring.entries
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries evicted because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).dropped
    }
}

impl fmt::Debug for OutputBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputBuffer")
            .field("len", &self.len())
            .field("dropped", &self.dropped())
            .finish()
    }
}

type Hub = RwLock<HashMap<String, OutputBuffer>>;

fn hub() -> &'static Hub {
    static HUB: OnceLock<Hub> = OnceLock::new();
    HUB.get_or_init(Default::default)
}

/// Keeps a task's buffer reachable by id until dropped.
#[must_use = "the buffer is unregistered when the registration is dropped"]
pub struct Registration {
    task_id: String,
}

impl Drop for Registration {
    fn drop(&mut self) {
        hub()
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.task_id);
    }
}

/// Makes `buffer` the capture target of `task_id`.
pub fn register(task_id: impl Into<String>, buffer: OutputBuffer) -> Registration {
    let task_id = task_id.into();
    hub()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(task_id.clone(), buffer);
    Registration { task_id }
}

/// Buffer of a currently registered task.
pub fn lookup(task_id: &str) -> Option<OutputBuffer> {
    hub()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(task_id)
        .cloned()
}
