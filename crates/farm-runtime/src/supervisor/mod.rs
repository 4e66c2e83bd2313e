//! The supervisor: owns a pool of worker processes, sizes it against the job backlog and stops
//! it in order.
//!
//! ```text
//!  spawn baseline ──► loop { worker heartbeats │ scaling check │ supervisor heartbeat }
//!                         │ shutdown requested (signal or dashboard)
//!                         ▼
//!  broadcast Shutdown ──► wait grace ──► SIGTERM ──► wait grace ──► SIGKILL ──► close broker
//! ```

mod handle;
pub use handle::SupervisorHandle;

mod plane;
pub use plane::ControlSink;
use plane::{ControlPlane, ControlSource, DepthProbe, DepthSource};

mod process;
pub use process::{ChildProcess, ExeSpawner, WorkerProcess, WorkerSpawner};

mod scaling;
pub use scaling::{ScaleDecision, ScaleInput, decide};

mod table;
pub use table::{HeartbeatOutcome, WorkerTable};

#[cfg(test)]
mod fake;

use std::{future::Future, pin::pin, sync::Arc, time::Duration};

use farm_broker::{BrokerError, topology};
use farm_core::{FarmConfig, MetricsHandle, ScaleDirection};
use farm_model::{ControlMessage, FarmLimits, SupervisorHeartbeat};
use tokio::time::{Instant, MissedTickBehavior, interval, sleep};
use tracing::{debug, error, info, trace, warn};

use crate::{RuntimeError, wait_for_shutdown_signal};

const EXIT_POLL: Duration = Duration::from_millis(100);
const KILL_WAIT: Duration = Duration::from_secs(5);
const RECOVER_BACKOFF: Duration = Duration::from_secs(1);

/// Runs a farm of worker processes bound to one manager id.
pub struct Supervisor {
    cfg: FarmConfig,
    handle: SupervisorHandle,
    spawner: Arc<dyn WorkerSpawner>,
}

impl Supervisor {
    pub fn new(
        cfg: FarmConfig,
        spawner: Arc<dyn WorkerSpawner>,
        metrics: MetricsHandle,
    ) -> Result<Self, RuntimeError> {
        let limits = FarmLimits {
            min_workers: cfg.min_workers,
            max_workers: cfg.max_workers,
        };
        if limits.validate().is_err() {
            return Err(farm_core::ConfigError::WorkerBounds {
                min: limits.min_workers,
                max: limits.max_workers,
            }
            .into());
        }
        let manager_id = cfg
            .manager_id
            .clone()
            .unwrap_or_else(|| farm_core::manager_id().to_string());
        let handle = SupervisorHandle::new(manager_id, limits, cfg.prefetch_per_worker as usize, metrics);
        Ok(Self { cfg, handle, spawner })
    }

    #[inline]
    pub fn handle(&self) -> SupervisorHandle {
        self.handle.clone()
    }

    /// Runs until a termination signal or [`SupervisorHandle::request_shutdown`], then stops
    /// every worker. Broker connections are closed last.
    pub async fn run(self) -> Result<(), RuntimeError> {
        let manager_id = self.handle.manager_id().to_string();
        let mut plane = ControlPlane::connect(&self.cfg, &manager_id).await?;
        let mut probe = DepthProbe::new(&self.cfg);

        let baseline = self.handle.limits().min_workers;
        info!(target: "farm.supervisor", manager_id = %manager_id, baseline, "starting farm");
        self.spawn_workers(baseline);

        self.supervise(&mut plane, &mut probe, wait_for_shutdown_signal()).await;

        self.stop_farm(&plane).await;
        probe.close().await;
        plane.close().await;
        info!(target: "farm.supervisor", "farm stopped");
        Ok(())
    }

    /// The steady-state loop: worker messages, scaling checks and the supervisor heartbeat,
    /// until shutdown is requested or `signal` fires.
    async fn supervise<P, D, S>(&self, plane: &mut P, probe: &mut D, signal: S)
    where
        P: ControlSource,
        D: DepthSource,
        S: Future<Output = std::io::Result<&'static str>>,
    {
        let mut scale_tick = interval(self.cfg.scale_check_interval.max(Duration::from_millis(100)));
        scale_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut beat_tick = interval(self.cfg.heartbeat_interval.max(Duration::from_secs(1)));
        beat_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let shutdown = self.handle.shutdown_token();
        let mut signal = pin!(signal);
        let mut signal_armed = true;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                res = &mut signal, if signal_armed => match res {
                    Ok(name) => {
                        info!(target: "farm.supervisor", signal = name, "termination signal received");
                        self.handle.request_shutdown();
                        break;
                    }
                    Err(e) => {
                        warn!(target: "farm.supervisor", error = %e, "signal handlers unavailable");
                        signal_armed = false;
                    }
                },
                msg = plane.next() => match msg {
                    Ok(msg) => self.on_control(msg),
                    Err(BrokerError::Closed) => {
                        warn!(target: "farm.supervisor", "control queue closed; redeclaring");
                        sleep(RECOVER_BACKOFF).await;
                        match plane.recover().await {
                            Ok(()) => info!(target: "farm.supervisor", "control queue redeclared"),
                            Err(e) => warn!(target: "farm.supervisor", error = %e, "control plane recovery failed"),
                        }
                    }
                    Err(e) => warn!(target: "farm.supervisor", error = %e, "unreadable control message"),
                },
                _ = beat_tick.tick() => self.broadcast_heartbeat(&*plane).await,
                _ = scale_tick.tick() => {
                    self.reap_exited();
                    match probe.depth().await {
                        Ok(depth) => self.scale(depth, &*plane).await,
                        Err(e) => warn!(target: "farm.supervisor", error = %e, "queue depth unavailable; skipping scaling check"),
                    }
                }
            }
        }
    }

    fn on_control(&self, msg: ControlMessage) {
        match msg {
            ControlMessage::Heartbeat(hb) => {
                let outcome = self.handle.with_table(|t| t.on_heartbeat(&hb, Instant::now()));
                self.handle.metrics().record_heartbeat();
                match outcome {
                    HeartbeatOutcome::Adopted => {
                        info!(target: "farm.supervisor", worker_id = %hb.worker_id, pid = hb.pid, "worker joined")
                    }
                    HeartbeatOutcome::Foreign => {
                        warn!(target: "farm.supervisor", worker_id = %hb.worker_id, pid = hb.pid, "heartbeat from a worker this supervisor did not spawn")
                    }
                    HeartbeatOutcome::Updated => {
                        trace!(target: "farm.supervisor", worker_id = %hb.worker_id, active = hb.active_task_count, "heartbeat")
                    }
                }
            }
            ControlMessage::StuckTask(ev) => {
                error!(
                    target: "farm.supervisor",
                    worker_id = %ev.worker_id,
                    pid = ev.pid,
                    task_id = ?ev.task_id,
                    "worker abandoned a stuck task and is exiting"
                );
                self.handle.metrics().record_stuck_task();
                self.handle.with_table(|t| t.retire(&ev.worker_id));
            }
            other => debug!(target: "farm.supervisor", kind = other.kind(), "ignoring control message"),
        }
    }

    async fn broadcast_heartbeat(&self, sink: &dyn ControlSink) {
        let msg = ControlMessage::SupervisorHeartbeat(SupervisorHeartbeat {
            manager_id: self.handle.manager_id().to_string(),
            timestamp: std::time::SystemTime::now(),
        });
        if let Err(e) = sink.send(&topology::broadcast_key(self.handle.manager_id()), &msg).await {
            warn!(target: "farm.supervisor", error = %e, "supervisor heartbeat not sent");
        }
    }

    fn spawn_workers(&self, n: usize) -> usize {
        let mut spawned = 0;
        for _ in 0..n {
            match self.spawner.spawn(self.handle.manager_id()) {
                Ok(process) => {
                    self.handle.with_table(|t| t.add_pending(process));
                    spawned += 1;
                }
                Err(e) => {
                    error!(target: "farm.supervisor", error = %e, "worker spawn failed");
                    break;
                }
            }
        }
        self.handle.record_workers();
        spawned
    }

    /// Drops exited and silent workers from the table.
    fn reap_exited(&self) {
        let window = self.cfg.liveness_window();
        let reaped = self.handle.with_table(|t| t.reap(window, Instant::now()));
        if reaped > 0 {
            debug!(target: "farm.supervisor", reaped, "exited workers removed");
            self.handle.record_workers();
        }
    }

    /// One scaling check against the observed queue depth.
    async fn scale(&self, depth: u32, sink: &dyn ControlSink) {
        self.handle.set_queue_depth(depth);
        let window = self.cfg.liveness_window();
        let now = Instant::now();

        let (input, idle) = self.handle.with_table(|t| {
            let idle = t.idle_workers(window, now);
            let input = ScaleInput {
                queue_depth: depth,
                current: t.current(),
                idle: idle.len(),
                limits: self.handle.limits(),
                prefetch: self.handle.prefetch(),
                up_batch: self.cfg.scale_up_batch_size,
                down_batch: self.cfg.scale_down_batch_size,
            };
            (input, idle)
        });

        match decide(&input) {
            ScaleDecision::Up(n) => {
                info!(target: "farm.supervisor", depth, current = input.current, capacity = input.capacity(), add = n, "scaling up");
                let spawned = self.spawn_workers(n);
                self.handle.metrics().record_scale(ScaleDirection::Up, spawned);
            }
            ScaleDecision::Down(n) => {
                info!(target: "farm.supervisor", depth, current = input.current, capacity = input.capacity(), retire = n, "scaling down");
                let grace_s = self.cfg.worker_shutdown_grace.as_secs();
                let mut retired = 0;
                for worker_id in idle.into_iter().take(n) {
                    let msg = ControlMessage::Shutdown { grace_s };
                    match sink.send(&topology::worker_key(&worker_id), &msg).await {
                        Ok(()) => {
                            self.handle.with_table(|t| t.retire(&worker_id));
                            retired += 1;
                        }
                        Err(e) => warn!(target: "farm.supervisor", worker_id = %worker_id, error = %e, "shutdown not delivered"),
                    }
                }
                self.handle.metrics().record_scale(ScaleDirection::Down, retired);
            }
            ScaleDecision::Hold => {
                trace!(target: "farm.supervisor", depth, current = input.current, "holding")
            }
        }
        self.handle.record_workers();
    }

    /// Stops every worker: broadcast shutdown, then SIGTERM, then SIGKILL, each escalation
    /// after the grace period.
    async fn stop_farm(&self, sink: &dyn ControlSink) {
        let grace = self.cfg.worker_shutdown_grace;
        self.handle.with_table(|t| t.drop_foreign());
        let alive = self.handle.with_table(|t| t.alive_len());
        info!(target: "farm.supervisor", workers = alive, grace_s = grace.as_secs(), "stopping farm");
        if alive == 0 {
            return;
        }

        let msg = ControlMessage::Shutdown {
            grace_s: grace.as_secs(),
        };
        if let Err(e) = sink.send(&topology::broadcast_key(self.handle.manager_id()), &msg).await {
            warn!(target: "farm.supervisor", error = %e, "shutdown broadcast not sent");
        }
        if self.wait_for_exit(grace).await {
            return;
        }

        let n = self.handle.with_table(|t| t.terminate_all());
        warn!(target: "farm.supervisor", workers = n, "workers still running after grace; sending SIGTERM");
        if self.wait_for_exit(grace).await {
            return;
        }

        let n = self.handle.with_table(|t| t.kill_all());
        error!(target: "farm.supervisor", workers = n, "workers ignored SIGTERM; sending SIGKILL");
        if !self.wait_for_exit(KILL_WAIT).await {
            error!(target: "farm.supervisor", "some workers could not be reaped");
        }
    }

    /// Polls until no owned worker process is alive or `limit` elapses.
    async fn wait_for_exit(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        let window = self.cfg.liveness_window();
        loop {
            let alive = self.handle.with_table(|t| {
                t.reap(window, Instant::now());
                t.alive_len()
            });
            self.handle.record_workers();
            if alive == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(EXIT_POLL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{Mutex, PoisonError},
        time::SystemTime,
    };

    use async_trait::async_trait;
    use farm_core::noop_metrics;
    use farm_model::WorkerHeartbeat;

    use super::*;
    use crate::supervisor::fake::{FakeSpawner, Stubborn};

    /// Records sent messages; a broadcast shutdown reaches every fake process.
    struct RecordingSink {
        spawner: Arc<FakeSpawner>,
        sent: Mutex<Vec<(String, ControlMessage)>>,
    }

    impl RecordingSink {
        fn new(spawner: Arc<FakeSpawner>) -> Self {
            Self {
                spawner,
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<(String, ControlMessage)> {
            self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }
    }

    #[async_trait]
    impl ControlSink for RecordingSink {
        async fn send(&self, routing_key: &str, msg: &ControlMessage) -> Result<(), BrokerError> {
            if routing_key.starts_with("workers.") && matches!(msg, ControlMessage::Shutdown { .. }) {
                for p in self.spawner.spawned() {
                    p.on_broadcast();
                }
            }
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((routing_key.to_string(), msg.clone()));
            Ok(())
        }
    }

    /// A control queue that starts out closed and delivers `inbox` once redeclared.
    struct FlakyPlane {
        sink: RecordingSink,
        open: bool,
        recoveries: usize,
        inbox: VecDeque<ControlMessage>,
    }

    #[async_trait]
    impl ControlSink for FlakyPlane {
        async fn send(&self, routing_key: &str, msg: &ControlMessage) -> Result<(), BrokerError> {
            self.sink.send(routing_key, msg).await
        }
    }

    #[async_trait]
    impl ControlSource for FlakyPlane {
        async fn next(&mut self) -> Result<ControlMessage, BrokerError> {
            if !self.open {
                return Err(BrokerError::Closed);
            }
            match self.inbox.pop_front() {
                Some(msg) => Ok(msg),
                None => std::future::pending().await,
            }
        }

        async fn recover(&mut self) -> Result<(), BrokerError> {
            self.recoveries += 1;
            self.open = true;
            Ok(())
        }
    }

    /// A depth source whose broker round trip always fails.
    struct UnreachableBroker;

    #[async_trait]
    impl DepthSource for UnreachableBroker {
        async fn depth(&mut self) -> Result<u32, BrokerError> {
            sleep(Duration::from_millis(2)).await;
            Err(BrokerError::Closed)
        }
    }

    fn stop_after(sup: &Supervisor, after: Duration) {
        let handle = sup.handle();
        tokio::spawn(async move {
            sleep(after).await;
            handle.request_shutdown();
        });
    }

    fn config() -> FarmConfig {
        FarmConfig {
            min_workers: 1,
            max_workers: 3,
            prefetch_per_worker: 10,
            worker_shutdown_grace: Duration::from_secs(2),
            manager_id: Some("manager_1_1".into()),
            ..FarmConfig::default()
        }
    }

    fn supervisor(stubborn: Stubborn) -> (Supervisor, Arc<FakeSpawner>, RecordingSink) {
        let spawner = Arc::new(FakeSpawner::new(stubborn));
        let sup = Supervisor::new(config(), spawner.clone(), noop_metrics()).unwrap();
        let sink = RecordingSink::new(spawner.clone());
        (sup, spawner, sink)
    }

    fn heartbeat_msg(pid: u32, active: usize) -> ControlMessage {
        ControlMessage::Heartbeat(WorkerHeartbeat {
            worker_id: format!("worker_{pid}"),
            pid,
            active_task_count: active,
            start_timestamp: SystemTime::UNIX_EPOCH + Duration::from_secs(pid as u64),
            timestamp: SystemTime::now(),
        })
    }

    fn heartbeat(sup: &Supervisor, pid: u32, active: usize) {
        sup.on_control(heartbeat_msg(pid, active));
    }

    #[test]
    fn rejects_inverted_bounds() {
        let cfg = FarmConfig {
            min_workers: 5,
            max_workers: 2,
            ..FarmConfig::default()
        };
        let res = Supervisor::new(cfg, Arc::new(FakeSpawner::new(Stubborn::No)), noop_metrics());
        assert!(matches!(res, Err(RuntimeError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn backlog_spawns_and_idle_farm_retires() {
        let (sup, spawner, sink) = supervisor(Stubborn::No);
        sup.spawn_workers(1);
        heartbeat(&sup, 100, 0);

        sup.scale(25, &sink).await;
        sup.scale(25, &sink).await;
        sup.scale(25, &sink).await;
        assert_eq!(spawner.spawned().len(), 3);
        let snap = sup.handle().snapshot();
        assert_eq!((snap.workers.len(), snap.pending), (1, 2));
        assert_eq!(snap.capacity, 30);
        assert_eq!(snap.queue_depth, Some(25));

        heartbeat(&sup, 101, 0);
        heartbeat(&sup, 102, 4);
        sup.scale(0, &sink).await;
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0 == "worker.worker_100" || sent[0].0 == "worker.worker_101");
        assert!(matches!(sent[0].1, ControlMessage::Shutdown { grace_s: 2 }));

        // the retiring worker no longer counts, the busy one is never picked
        sup.scale(0, &sink).await;
        assert_eq!(sink.sent().len(), 2);
        sup.scale(0, &sink).await;
        assert_eq!(sink.sent().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn limits_changes_apply_on_next_check() {
        let (sup, spawner, sink) = supervisor(Stubborn::No);
        sup.spawn_workers(1);
        sup.handle()
            .set_limits(FarmLimits {
                min_workers: 3,
                max_workers: 4,
            })
            .unwrap();

        sup.scale(0, &sink).await;
        assert_eq!(spawner.spawned().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dead_workers_are_replaced() {
        let (sup, spawner, sink) = supervisor(Stubborn::No);
        sup.spawn_workers(1);
        spawner.spawned()[0].exit();

        sup.reap_exited();
        sup.scale(0, &sink).await;
        assert_eq!(spawner.spawned().len(), 2);
        assert_eq!(sup.handle().snapshot().pending, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_control_queue_is_redeclared_between_scaling_checks() {
        let (sup, spawner, sink) = supervisor(Stubborn::No);
        sup.spawn_workers(1);
        let mut plane = FlakyPlane {
            sink,
            open: false,
            recoveries: 0,
            inbox: VecDeque::from([heartbeat_msg(100, 2)]),
        };

        stop_after(&sup, Duration::from_secs(30));
        sup.supervise(&mut plane, &mut UnreachableBroker, std::future::pending()).await;

        assert_eq!(plane.recoveries, 1);
        assert_eq!(spawner.spawned().len(), 1);
        let snap = sup.handle().snapshot();
        assert_eq!((snap.workers.len(), snap.pending), (1, 0));
        assert_eq!(snap.workers[0].active_tasks, 2);
        assert!(
            plane
                .sink
                .sent()
                .iter()
                .any(|(_, msg)| matches!(msg, ControlMessage::SupervisorHeartbeat(_)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exited_workers_are_reaped_while_depth_is_unknown() {
        let (sup, spawner, sink) = supervisor(Stubborn::No);
        sup.spawn_workers(2);
        heartbeat(&sup, 100, 0);
        spawner.spawned()[1].exit();
        let mut plane = FlakyPlane {
            sink,
            open: true,
            recoveries: 0,
            inbox: VecDeque::new(),
        };

        stop_after(&sup, Duration::from_secs(3));
        sup.supervise(&mut plane, &mut UnreachableBroker, std::future::pending()).await;

        let snap = sup.handle().snapshot();
        assert_eq!((snap.workers.len(), snap.pending), (1, 0));
        assert_eq!(spawner.spawned().len(), 2);
        assert_eq!(plane.recoveries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_report_retires_the_worker() {
        let (sup, _spawner, _sink) = supervisor(Stubborn::No);
        sup.spawn_workers(2);
        heartbeat(&sup, 100, 1);
        sup.on_control(ControlMessage::StuckTask(farm_model::StuckTask {
            worker_id: "worker_100".into(),
            pid: 100,
            task_id: Some("100_7".into()),
            start_timestamp: SystemTime::now(),
            timestamp: SystemTime::now(),
        }));
        assert_eq!(sup.handle.with_table(|t| t.current()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cooperative_workers_stop_on_broadcast() {
        let (sup, spawner, sink) = supervisor(Stubborn::No);
        sup.spawn_workers(2);
        heartbeat(&sup, 100, 0);

        sup.stop_farm(&sink).await;
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "workers.manager_1_1");
        for p in spawner.spawned() {
            assert!(!p.is_alive());
            assert_eq!((p.terms(), p.kills()), (0, 0));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ignored_broadcast_escalates_to_sigterm() {
        let (sup, spawner, sink) = supervisor(Stubborn::UntilTerm);
        sup.spawn_workers(2);

        let started = Instant::now();
        sup.stop_farm(&sink).await;
        assert!(started.elapsed() >= Duration::from_secs(2));
        for p in spawner.spawned() {
            assert_eq!((p.terms(), p.kills()), (1, 0));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ignored_sigterm_escalates_to_sigkill() {
        let (sup, spawner, sink) = supervisor(Stubborn::UntilKill);
        sup.spawn_workers(1);

        let started = Instant::now();
        sup.stop_farm(&sink).await;
        assert!(started.elapsed() >= Duration::from_secs(4));
        let p = &spawner.spawned()[0];
        assert!(!p.is_alive());
        assert_eq!((p.terms(), p.kills()), (1, 1));
        assert_eq!(sup.handle().snapshot().pending, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn supervisor_heartbeat_goes_to_broadcast_key() {
        let (sup, _spawner, sink) = supervisor(Stubborn::No);
        sup.broadcast_heartbeat(&sink).await;
        let sent = sink.sent();
        assert_eq!(sent[0].0, "workers.manager_1_1");
        assert!(matches!(&sent[0].1, ControlMessage::SupervisorHeartbeat(hb) if hb.manager_id == "manager_1_1"));
    }
}
