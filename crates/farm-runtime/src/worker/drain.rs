//! The drain phase of a stopping worker.
use std::time::Duration;

use async_trait::async_trait;
use farm_exec::TaskReport;
use tokio::{
    sync::mpsc,
    time::{Instant, MissedTickBehavior, interval},
};
use tracing::{info, warn};

use super::{ActiveTasks, WorkerExit};

const DRAIN_POLL: Duration = Duration::from_millis(200);

/// The broker side of a drain.
#[async_trait]
pub(crate) trait DrainPort: Send {
    type Late: Send;

    /// A delivery that arrived after consuming stopped; `None` once the consumer is gone.
    async fn late(&mut self) -> Option<Self::Late>;

    /// Hands a late delivery back to the queue.
    async fn release(&mut self, late: Self::Late);

    async fn heartbeat(&mut self, active: usize);
}

/// How a drain ended.
#[derive(Debug)]
pub(crate) enum DrainEnd {
    Finished(WorkerExit),
    /// A task hit its hard timeout while draining.
    Stuck(TaskReport),
}

/// Waits for the running tasks to finish, for at most `grace`.
///
/// Late deliveries are released as they arrive. Bound workers keep heartbeating every
/// `heartbeat`.
pub(crate) async fn drain<P: DrainPort>(
    port: &mut P,
    active: &ActiveTasks,
    grace: Duration,
    stuck: &mut mpsc::UnboundedReceiver<TaskReport>,
    heartbeat: Option<Duration>,
) -> DrainEnd {
    info!(target: "farm.worker", active = active.count(), grace_s = grace.as_secs(), "draining");
    let deadline = Instant::now() + grace;
    let bound = heartbeat.is_some();
    let mut beat = interval(heartbeat.unwrap_or(DRAIN_POLL));
    beat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut poll = interval(DRAIN_POLL);
    let mut consuming = true;

    loop {
        if active.is_idle() {
            info!(target: "farm.worker", "drained");
            return DrainEnd::Finished(WorkerExit::Drained);
        }
        if Instant::now() >= deadline {
            let abandoned = active.count();
            warn!(target: "farm.worker", abandoned, "grace elapsed with tasks still running");
            return DrainEnd::Finished(WorkerExit::GraceElapsed { abandoned });
        }
        tokio::select! {
            Some(report) = stuck.recv() => return DrainEnd::Stuck(report),
            late = port.late(), if consuming => match late {
                Some(d) => port.release(d).await,
                None => consuming = false,
            },
            _ = beat.tick(), if bound => port.heartbeat(active.count()).await,
            _ = poll.tick() => {},
        }
    }
}
