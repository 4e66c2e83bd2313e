//! The worker: consumes jobs with bounded prefetch, reports to its supervisor and drains on
//! shutdown.
//!
//! Stop conditions, all followed by a drain of at most the grace period:
//! - a `Shutdown` control message (targeted or broadcast)
//! - SIGINT / SIGTERM / SIGQUIT
//! - no supervisor heartbeat for three heartbeat intervals
//! - the job or control consumer closing
//!
//! A task past its hard timeout is the exception: the worker reports it and exits immediately
//! through [`abandon_and_exit`].

mod active;
pub use active::{ActiveSlot, ActiveTasks};

mod watchdog;
pub use watchdog::LivenessClock;

mod drain;
use drain::{DrainEnd, DrainPort, drain};

use std::{
    pin::pin,
    sync::Arc,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use farm_broker::{
    BrokerLink, ControlPublisher, ControlQueue, Delivery, DeliveryAcker, requeue, timeout_headers,
    topology,
};
use farm_core::{CallableRegistry, FarmConfig};
use farm_exec::{Incoming, Task, TaskEnv, TaskHooks, TaskReport};
use farm_model::{ControlMessage, StuckTask, WorkerHeartbeat};
use futures_util::StreamExt;
use lapin::{
    Consumer,
    options::{BasicCancelOptions, BasicConsumeOptions, BasicQosOptions},
    types::FieldTable,
};
use tokio::{
    sync::mpsc,
    time::{Instant, MissedTickBehavior, interval},
};
use tracing::{debug, error, info, trace, warn};

use crate::{RuntimeError, wait_for_shutdown_signal};

/// Exit code of a worker that abandoned a stuck task.
pub const STUCK_EXIT_CODE: i32 = 1;

const WATCHDOG_TICK: Duration = Duration::from_secs(1);

/// How [`Worker::run`] ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerExit {
    /// Every running task finished within the grace period.
    Drained,
    /// The grace period elapsed with tasks still running; their messages return to the queue
    /// once the connection is closed.
    GraceElapsed { abandoned: usize },
}

/// Ends the process right away with [`STUCK_EXIT_CODE`].
///
/// Sibling tasks of the stuck one are abandoned: their unacknowledged messages are redelivered
/// by the broker.
pub fn abandon_and_exit(task_id: &str) -> ! {
    error!(target: "farm.worker", task_id, code = STUCK_EXIT_CODE, "abandoning stuck task; exiting");
    std::process::exit(STUCK_EXIT_CODE)
}

pub struct Worker {
    cfg: FarmConfig,
    env: TaskEnv,
    worker_id: String,
    manager_id: Option<String>,
    started_at: SystemTime,
}

impl Worker {
    pub fn new(cfg: FarmConfig, registry: CallableRegistry) -> Self {
        let env = TaskEnv::new(registry, &cfg);
        Self {
            worker_id: farm_core::worker_id().to_string(),
            manager_id: cfg.manager_id.clone(),
            started_at: SystemTime::now(),
            env,
            cfg,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn TaskHooks>) -> Self {
        self.env = self.env.with_hooks(hooks);
        self
    }

    #[inline]
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Bound workers heartbeat to and watch a supervisor; standalone ones only consume.
    #[inline]
    pub fn manager_id(&self) -> Option<&str> {
        self.manager_id.as_deref()
    }

    pub async fn run(self) -> Result<WorkerExit, RuntimeError> {
        let link = BrokerLink::connect(&self.cfg.broker_url, "worker").await?;
        let res = self.serve(&link).await;
        link.close().await;
        res
    }

    async fn serve(&self, link: &BrokerLink) -> Result<WorkerExit, RuntimeError> {
        let jobs = link.channel();
        topology::declare_jobs_queue(jobs, &self.cfg.jobs_queue).await?;
        jobs.basic_qos(self.cfg.prefetch_per_worker, BasicQosOptions::default())
            .await?;

        let control_channel = link.open_channel().await?;
        let control =
            ControlPublisher::declare(control_channel.clone(), self.cfg.control_exchange.as_str()).await?;
        let mut control_queue = ControlQueue::open(
            &control_channel,
            &self.cfg.control_exchange,
            "",
            &self.control_keys(),
            &format!("{}.control", self.worker_id),
        )
        .await?;

        let consumer_tag = format!("{}.jobs", self.worker_id);
        let mut consumer = jobs
            .basic_consume(
                &self.cfg.jobs_queue,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        info!(
            target: "farm.worker",
            worker_id = %self.worker_id,
            manager_id = ?self.manager_id,
            queue = %self.cfg.jobs_queue,
            prefetch = self.cfg.prefetch_per_worker,
            "consuming"
        );

        let bound = self.manager_id.is_some();
        let active = ActiveTasks::new();
        let (stuck_tx, mut stuck_rx) = mpsc::unbounded_channel::<TaskReport>();
        let mut beat = interval(self.cfg.heartbeat_interval.max(Duration::from_secs(1)));
        beat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut watch = interval(WATCHDOG_TICK);
        let mut liveness = LivenessClock::new(self.cfg.liveness_window(), Instant::now());
        let mut signal = pin!(wait_for_shutdown_signal());
        let mut signal_armed = true;
        let default_grace = self.cfg.worker_shutdown_grace;

        let grace = loop {
            tokio::select! {
                Some(report) = stuck_rx.recv() => {
                    self.report_stuck(link, &control, &report).await;
                    abandon_and_exit(&report.task_id)
                }
                delivery = consumer.next() => match delivery {
                    Some(Ok(d)) => self.dispatch(d, &active, &stuck_tx),
                    Some(Err(e)) => {
                        warn!(target: "farm.worker", error = %e, "job consumer failed");
                        break default_grace;
                    }
                    None => {
                        warn!(target: "farm.worker", "job consumer closed");
                        break default_grace;
                    }
                },
                msg = control_queue.next() => match msg {
                    Some(Ok(ControlMessage::Shutdown { grace_s })) => {
                        info!(target: "farm.worker", grace_s, "shutdown requested by supervisor");
                        break Duration::from_secs(grace_s);
                    }
                    Some(Ok(ControlMessage::SupervisorHeartbeat(hb))) => {
                        if self.manager_id.as_deref() == Some(hb.manager_id.as_str()) {
                            liveness.touch(Instant::now());
                        }
                    }
                    Some(Ok(other)) => debug!(target: "farm.worker", kind = other.kind(), "ignoring control message"),
                    Some(Err(e)) => warn!(target: "farm.worker", error = %e, "malformed control message"),
                    None => {
                        warn!(target: "farm.worker", "control consumer closed");
                        break default_grace;
                    }
                },
                _ = beat.tick(), if bound => self.send_heartbeat(&control, active.count()).await,
                _ = watch.tick(), if bound => {
                    if liveness.is_expired(Instant::now()) {
                        warn!(
                            target: "farm.worker",
                            window_s = liveness.window().as_secs(),
                            "supervisor silent; shutting down"
                        );
                        break default_grace;
                    }
                },
                res = &mut signal, if signal_armed => match res {
                    Ok(name) => {
                        info!(target: "farm.worker", signal = name, "termination signal received");
                        break default_grace;
                    }
                    Err(e) => {
                        warn!(target: "farm.worker", error = %e, "signal handlers unavailable");
                        signal_armed = false;
                    }
                },
            }
        };

        if let Err(e) = jobs
            .basic_cancel(&consumer_tag, BasicCancelOptions::default())
            .await
        {
            warn!(target: "farm.worker", error = %e, "consumer cancel failed");
        }

        let mut port = LiveDrain {
            worker: self,
            consumer: &mut consumer,
            control: &control,
        };
        let heartbeat = bound.then(|| self.cfg.heartbeat_interval.max(Duration::from_secs(1)));
        match drain(&mut port, &active, grace, &mut stuck_rx, heartbeat).await {
            DrainEnd::Finished(exit) => Ok(exit),
            DrainEnd::Stuck(report) => {
                self.report_stuck(link, &control, &report).await;
                abandon_and_exit(&report.task_id)
            }
        }
    }

    fn control_keys(&self) -> Vec<String> {
        let mut keys = vec![topology::worker_key(&self.worker_id)];
        if let Some(m) = &self.manager_id {
            keys.push(topology::broadcast_key(m));
        }
        keys
    }

    /// Starts a task for one delivery.
    fn dispatch(&self, delivery: Delivery, active: &ActiveTasks, stuck: &mpsc::UnboundedSender<TaskReport>) {
        let headers = timeout_headers(&delivery.properties);
        let task_id = format!("{}_{}", farm_core::pid(), delivery.delivery_tag);
        let incoming = Incoming {
            task_id,
            body: delivery.data,
            headers,
            acker: Arc::new(DeliveryAcker::new(delivery.acker)),
        };

        let task = Task::intake(&self.env, incoming);
        trace!(target: "farm.worker", task_id = task.id(), "task received");
        let slot = active.acquire();
        let stuck = stuck.clone();
        tokio::spawn(async move {
            let report = task.run().await;
            drop(slot);
            if report.is_stuck() {
                forward_stuck(&stuck, report);
            }
        });
    }

    /// Returns a delivery received while draining to the queue.
    async fn release(&self, delivery: &Delivery) {
        if let Err(e) = requeue(delivery).await {
            warn!(target: "farm.worker", delivery_tag = delivery.delivery_tag, error = %e, "requeue failed");
        }
    }

    async fn send_heartbeat(&self, control: &ControlPublisher, active: usize) {
        let Some(manager_id) = &self.manager_id else { return };
        if let Err(e) = control
            .send(&topology::supervisor_key(manager_id), &self.heartbeat(active))
            .await
        {
            warn!(target: "farm.worker", error = %e, "heartbeat not sent");
        }
    }

    /// Tells the supervisor about a stuck task and closes the broker connection.
    async fn report_stuck(&self, link: &BrokerLink, control: &ControlPublisher, report: &TaskReport) {
        error!(
            target: "farm.worker",
            task_id = %report.task_id,
            callable = %report.callable_reference,
            "task exceeded its hard timeout"
        );
        if let Some(manager_id) = &self.manager_id
            && let Err(e) = control
                .send(&topology::supervisor_key(manager_id), &self.stuck_event(report))
                .await
        {
            warn!(target: "farm.worker", error = %e, "stuck task report not sent");
        }
        link.close().await;
    }

    fn heartbeat(&self, active: usize) -> ControlMessage {
        ControlMessage::Heartbeat(WorkerHeartbeat {
            worker_id: self.worker_id.clone(),
            pid: farm_core::pid(),
            active_task_count: active,
            start_timestamp: self.started_at,
            timestamp: SystemTime::now(),
        })
    }

    fn stuck_event(&self, report: &TaskReport) -> ControlMessage {
        ControlMessage::StuckTask(StuckTask {
            worker_id: self.worker_id.clone(),
            pid: farm_core::pid(),
            task_id: Some(report.task_id.clone()),
            start_timestamp: self.started_at,
            timestamp: SystemTime::now(),
        })
    }
}

/// Hands a stuck report to the serve loop; false once that loop is gone.
fn forward_stuck(stuck: &mpsc::UnboundedSender<TaskReport>, report: TaskReport) -> bool {
    match stuck.send(report) {
        Ok(()) => true,
        Err(unsent) => {
            warn!(target: "farm.worker", task_id = %unsent.0.task_id, "stuck task report dropped; worker already stopping");
            false
        }
    }
}

/// Drain side backed by the job consumer and the control publisher.
struct LiveDrain<'a> {
    worker: &'a Worker,
    consumer: &'a mut Consumer,
    control: &'a ControlPublisher,
}

#[async_trait]
impl DrainPort for LiveDrain<'_> {
    type Late = Delivery;

    async fn late(&mut self) -> Option<Delivery> {
        match self.consumer.next().await {
            Some(Ok(d)) => Some(d),
            Some(Err(_)) | None => None,
        }
    }

    async fn release(&mut self, late: Delivery) {
        self.worker.release(&late).await;
    }

    async fn heartbeat(&mut self, active: usize) {
        self.worker.send_heartbeat(self.control, active).await;
    }
}

#[cfg(test)]
mod tests {
    use farm_model::TaskStatus;

    use super::*;

    fn worker(manager_id: Option<&str>) -> Worker {
        let cfg = FarmConfig {
            manager_id: manager_id.map(str::to_string),
            ..FarmConfig::default()
        };
        Worker::new(cfg, CallableRegistry::new())
    }

    #[test]
    fn bound_worker_listens_on_broadcast() {
        let w = worker(Some("manager_1_1"));
        assert_eq!(
            w.control_keys(),
            vec![format!("worker.{}", w.worker_id()), "workers.manager_1_1".to_string()]
        );
        assert_eq!(worker(None).control_keys().len(), 1);
    }

    #[test]
    fn heartbeat_reports_active_tasks() {
        let w = worker(Some("manager_1_1"));
        let ControlMessage::Heartbeat(hb) = w.heartbeat(3) else {
            panic!("expected heartbeat");
        };
        assert_eq!(hb.worker_id, w.worker_id());
        assert_eq!(hb.pid, std::process::id());
        assert_eq!(hb.active_task_count, 3);
        assert!(hb.timestamp >= hb.start_timestamp);
    }

    fn stuck_report() -> TaskReport {
        TaskReport {
            task_id: "42_7".into(),
            callable_reference: "demo::sleepy".into(),
            status: TaskStatus::HardTimeout,
            result: None,
            error: None,
            acked: true,
            started_at: SystemTime::now(),
            finished_at: SystemTime::now(),
            output: Vec::new(),
        }
    }

    #[test]
    fn stuck_event_names_the_task() {
        let w = worker(Some("manager_1_1"));
        let report = stuck_report();
        let ControlMessage::StuckTask(ev) = w.stuck_event(&report) else {
            panic!("expected stuck task");
        };
        assert_eq!(ev.task_id.as_deref(), Some("42_7"));
        assert_eq!(ev.worker_id, w.worker_id());
    }

    #[test]
    fn stuck_report_after_serve_loop_ended_is_not_lost_silently() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(forward_stuck(&tx, stuck_report()));
        assert_eq!(rx.try_recv().unwrap().task_id, "42_7");

        drop(rx);
        assert!(!forward_stuck(&tx, stuck_report()));
    }
}
