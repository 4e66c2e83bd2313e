use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use super::process::{WorkerProcess, WorkerSpawner};
use crate::RuntimeError;

/// How a fake process reacts to being stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stubborn {
    /// Exits on the broadcast shutdown.
    No,
    /// Ignores the broadcast, exits on SIGTERM.
    UntilTerm,
    /// Only SIGKILL stops it.
    UntilKill,
}

#[derive(Debug)]
pub struct FakeState {
    pid: u32,
    alive: AtomicBool,
    terms: AtomicUsize,
    kills: AtomicUsize,
    stubborn: Stubborn,
}

impl FakeState {
    pub fn exit(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn terms(&self) -> usize {
        self.terms.load(Ordering::SeqCst)
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    /// The broadcast shutdown reached this process.
    pub fn on_broadcast(&self) {
        if self.stubborn == Stubborn::No {
            self.exit();
        }
    }
}

pub struct FakeProcess(Arc<FakeState>);

impl FakeProcess {
    pub fn new(pid: u32) -> (Self, Arc<FakeState>) {
        Self::with(pid, Stubborn::No)
    }

    pub fn with(pid: u32, stubborn: Stubborn) -> (Self, Arc<FakeState>) {
        let state = Arc::new(FakeState {
            pid,
            alive: AtomicBool::new(true),
            terms: AtomicUsize::new(0),
            kills: AtomicUsize::new(0),
            stubborn,
        });
        (Self(state.clone()), state)
    }
}

impl WorkerProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.0.pid)
    }

    fn is_alive(&mut self) -> bool {
        self.0.is_alive()
    }

    fn terminate(&mut self) {
        self.0.terms.fetch_add(1, Ordering::SeqCst);
        if self.0.stubborn != Stubborn::UntilKill {
            self.0.exit();
        }
    }

    fn kill(&mut self) {
        self.0.kills.fetch_add(1, Ordering::SeqCst);
        self.0.exit();
    }
}

/// Hands out fake processes with increasing pids and remembers them.
pub struct FakeSpawner {
    next_pid: AtomicUsize,
    stubborn: Stubborn,
    spawned: Mutex<Vec<Arc<FakeState>>>,
}

impl FakeSpawner {
    pub fn new(stubborn: Stubborn) -> Self {
        Self {
            next_pid: AtomicUsize::new(100),
            stubborn,
            spawned: Mutex::new(Vec::new()),
        }
    }

    pub fn spawned(&self) -> Vec<Arc<FakeState>> {
        self.spawned.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl WorkerSpawner for FakeSpawner {
    fn spawn(&self, _manager_id: &str) -> Result<Box<dyn WorkerProcess>, RuntimeError> {
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst) as u32;
        let (p, state) = FakeProcess::with(pid, self.stubborn);
        self.spawned.lock().unwrap_or_else(PoisonError::into_inner).push(state);
        Ok(Box::new(p))
    }
}
