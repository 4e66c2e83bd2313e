use std::{
    ffi::OsString,
    path::PathBuf,
    process::Stdio,
};

use farm_core::config::ENV_MANAGER_ID;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::RuntimeError;

/// Handle on one spawned worker process.
pub trait WorkerProcess: Send + 'static {
    fn pid(&self) -> Option<u32>;

    /// Reaps the process if it has exited.
    fn is_alive(&mut self) -> bool;

    /// Asks the process to stop gracefully (SIGTERM).
    fn terminate(&mut self);

    /// Stops the process unconditionally (SIGKILL).
    fn kill(&mut self);
}

/// Starts worker processes bound to a supervisor.
pub trait WorkerSpawner: Send + Sync + 'static {
    fn spawn(&self, manager_id: &str) -> Result<Box<dyn WorkerProcess>, RuntimeError>;
}

/// A worker running as an OS child process.
pub struct ChildProcess {
    child: Child,
    pid: Option<u32>,
}

impl ChildProcess {
    pub fn new(child: Child) -> Self {
        let pid = child.id();
        Self { child, pid }
    }
}

impl WorkerProcess for ChildProcess {
    #[inline]
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    #[cfg(unix)]
    fn terminate(&mut self) {
        let Some(pid) = self.pid else { return };
        // SAFETY: plain kill(2) on a pid we spawned and have not reaped yet.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            debug!(target: "farm.supervisor.process", pid, error = %std::io::Error::last_os_error(), "SIGTERM failed");
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) {
        self.kill();
    }

    fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!(target: "farm.supervisor.process", pid = ?self.pid, error = %e, "kill failed");
        }
    }
}

/// Spawns workers by re-running a program with the `worker` subcommand.
#[derive(Clone, Debug)]
pub struct ExeSpawner {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ExeSpawner {
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// The currently running executable, started as `<exe> worker`.
    pub fn current_exe() -> Result<Self, RuntimeError> {
        Ok(Self::new(std::env::current_exe()?, ["worker"]))
    }
}

impl WorkerSpawner for ExeSpawner {
    fn spawn(&self, manager_id: &str) -> Result<Box<dyn WorkerProcess>, RuntimeError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg("--manager-id")
            .arg(manager_id)
            .env(ENV_MANAGER_ID, manager_id)
            .stdin(Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| {
                warn!(target: "farm.supervisor.process", program = %self.program.display(), error = %e, "spawn failed");
                RuntimeError::Spawn(e.to_string())
            })?;

        let process = ChildProcess::new(child);
        debug!(target: "farm.supervisor.process", pid = ?process.pid(), "worker process started");
        Ok(Box::new(process))
    }
}
