use std::{
    collections::{HashMap, HashSet},
    time::{Duration, SystemTime},
};

use farm_model::{WorkerHeartbeat, WorkerId, WorkerInfo};
use tokio::time::Instant;

use super::process::WorkerProcess;

/// What a heartbeat did to the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// A known worker refreshed its entry.
    Updated,
    /// A pending process announced itself and is now tracked.
    Adopted,
    /// The heartbeat came from a process this supervisor did not spawn; it is tracked anyway.
    Foreign,
}

struct Tracked {
    process: Option<Box<dyn WorkerProcess>>,
    pid: u32,
    active_tasks: usize,
    last_heartbeat: SystemTime,
    last_seen: Instant,
    started_at: SystemTime,
}

impl Tracked {
    fn is_alive(&mut self) -> bool {
        match self.process.as_mut() {
            Some(p) => p.is_alive(),
            None => true,
        }
    }
}

/// Worker processes owned by one supervisor.
///
/// A spawned process stays *pending* until its first heartbeat; after that it is *tracked* under
/// its worker id. Workers asked to shut down are *retiring* and no longer count towards the farm.
#[derive(Default)]
pub struct WorkerTable {
    pending: Vec<Box<dyn WorkerProcess>>,
    workers: HashMap<WorkerId, Tracked>,
    retiring: HashSet<WorkerId>,
}

impl WorkerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pending(&mut self, process: Box<dyn WorkerProcess>) {
        self.pending.push(process);
    }

    /// Records a heartbeat received at `now`.
    pub fn on_heartbeat(&mut self, hb: &WorkerHeartbeat, now: Instant) -> HeartbeatOutcome {
        if let Some(w) = self.workers.get_mut(&hb.worker_id) {
            w.active_tasks = hb.active_task_count;
            w.last_heartbeat = hb.timestamp;
            w.last_seen = now;
            return HeartbeatOutcome::Updated;
        }

        let adopted = self
            .pending
            .iter()
            .position(|p| p.pid() == Some(hb.pid))
            .map(|idx| self.pending.swap_remove(idx));
        let outcome = match adopted {
            Some(_) => HeartbeatOutcome::Adopted,
            None => HeartbeatOutcome::Foreign,
        };

        self.workers.insert(
            hb.worker_id.clone(),
            Tracked {
                process: adopted,
                pid: hb.pid,
                active_tasks: hb.active_task_count,
                last_heartbeat: hb.timestamp,
                last_seen: now,
                started_at: hb.start_timestamp,
            },
        );
        outcome
    }

    /// Drops every process that has exited. Foreign workers are dropped once their heartbeats
    /// are older than `window`.
    pub fn reap(&mut self, window: Duration, now: Instant) -> usize {
        let before = self.pending.len() + self.workers.len();

        self.pending.retain_mut(|p| p.is_alive());
        self.workers.retain(|_, w| {
            if w.process.is_none() {
                return now.saturating_duration_since(w.last_seen) < window;
            }
            w.is_alive()
        });
        let workers = &self.workers;
        self.retiring.retain(|id| workers.contains_key(id));

        before - (self.pending.len() + self.workers.len())
    }

    /// Marks a worker as leaving the farm.
    pub fn retire(&mut self, worker_id: &str) -> bool {
        if self.workers.contains_key(worker_id) {
            self.retiring.insert(worker_id.to_string())
        } else {
            false
        }
    }

    /// Workers counted towards the farm: pending plus tracked, minus retiring.
    pub fn current(&self) -> usize {
        self.pending.len() + self.workers.len() - self.retiring.len()
    }

    #[inline]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Tracked, non-retiring workers.
    #[inline]
    pub fn tracked_len(&self) -> usize {
        self.workers.len() - self.retiring.len()
    }

    /// Processes not yet known to have exited, retiring ones included.
    #[inline]
    pub fn alive_len(&self) -> usize {
        self.pending.len() + self.workers.len()
    }

    /// Idle workers with a heartbeat no older than `window`, oldest first.
    pub fn idle_workers(&self, window: Duration, now: Instant) -> Vec<WorkerId> {
        let mut idle: Vec<(&WorkerId, &Tracked)> = self
            .workers
            .iter()
            .filter(|(id, w)| {
                w.active_tasks == 0
                    && !self.retiring.contains(*id)
                    && now.saturating_duration_since(w.last_seen) <= window
            })
            .collect();
        idle.sort_by(|a, b| a.1.started_at.cmp(&b.1.started_at).then_with(|| a.0.cmp(b.0)));
        idle.into_iter().map(|(id, _)| id.clone()).collect()
    }

    /// Tracked workers, retiring included, sorted by worker id.
    pub fn workers(&self) -> Vec<WorkerInfo> {
        let mut out: Vec<WorkerInfo> = self
            .workers
            .iter()
            .map(|(id, w)| WorkerInfo {
                worker_id: id.clone(),
                pid: w.pid,
                active_tasks: w.active_tasks,
                last_heartbeat: w.last_heartbeat,
                started_at: w.started_at,
            })
            .collect();
        out.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        out
    }

    /// Sends SIGTERM to every live process. Returns how many were signalled.
    pub fn terminate_all(&mut self) -> usize {
        self.for_each_process(|p| p.terminate())
    }

    /// Sends SIGKILL to every live process. Returns how many were signalled.
    pub fn kill_all(&mut self) -> usize {
        self.for_each_process(|p| p.kill())
    }

    fn for_each_process(&mut self, mut f: impl FnMut(&mut dyn WorkerProcess)) -> usize {
        let mut n = 0;
        let owned = self
            .pending
            .iter_mut()
            .chain(self.workers.values_mut().filter_map(|w| w.process.as_mut()));
        for p in owned {
            if p.is_alive() {
                f(&mut **p);
                n += 1;
            }
        }
        n
    }

    /// Forgets workers this supervisor cannot signal; used once the farm is stopping.
    pub fn drop_foreign(&mut self) {
        self.workers.retain(|_, w| w.process.is_some());
        let workers = &self.workers;
        self.retiring.retain(|id| workers.contains_key(id));
    }
}
