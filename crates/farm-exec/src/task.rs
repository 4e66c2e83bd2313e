use std::{
    any::Any,
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::Arc,
    time::{Instant, SystemTime},
};

use farm_core::{
    AckGuard, Acker, Call, CallError, Callable, CallableRegistry, CoreError, DecodedJob,
    FarmConfig, JobCodec, OutputBuffer, TaskContext, Timeouts, capture, registry::CallResult,
};
use farm_model::{OutputEntry, RawTimeoutHeaders, TaskStatus};
use futures_util::FutureExt;
use serde_json::Value;
use tokio::{
    task::{JoinError, JoinHandle},
    time::sleep_until,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info_span, warn};

use crate::{NoHooks, TaskError, TaskHooks, TaskInfo};

/// A hook started by a watchdog arm that keeps running alongside the remaining watchdogs.
type PendingHook = Pin<Box<dyn Future<Output = std::thread::Result<()>> + Send>>;

/// One message as handed over by the consumer.
pub struct Incoming {
    pub task_id: String,
    pub body: Vec<u8>,
    pub headers: RawTimeoutHeaders,
    pub acker: Arc<dyn Acker>,
}

/// Everything a worker shares between its tasks.
#[derive(Clone)]
pub struct TaskEnv {
    pub registry: CallableRegistry,
    pub codec: JobCodec,
    pub defaults: Timeouts,
    pub output_capacity: usize,
    pub hooks: Arc<dyn TaskHooks>,
}

impl TaskEnv {
    pub fn new(registry: CallableRegistry, cfg: &FarmConfig) -> Self {
        Self {
            registry,
            codec: JobCodec::from_config(cfg),
            defaults: cfg.default_timeouts(),
            output_capacity: cfg.task_output_capacity,
            hooks: Arc::new(NoHooks),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn TaskHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_timeouts(mut self, defaults: Timeouts) -> Self {
        self.defaults = defaults;
        self
    }
}

/// Final state of a task.
#[derive(Clone, Debug)]
pub struct TaskReport {
    pub task_id: String,
    pub callable_reference: String,
    pub status: TaskStatus,
    pub result: Option<Value>,
    pub error: Option<TaskError>,
    pub acked: bool,
    pub started_at: SystemTime,
    pub finished_at: SystemTime,
    pub output: Vec<OutputEntry>,
}

impl TaskReport {
    /// The task outlived its hard timeout; its work may still be running.
    #[inline]
    pub fn is_stuck(&self) -> bool {
        self.status == TaskStatus::HardTimeout
    }

    /// Captured output rendered one entry per line.
    pub fn captured_text(&self) -> String {
        self.output
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Bookkeeping shared by every path of a task.
struct Tracker {
    id: String,
    reference: String,
    status: TaskStatus,
    timeouts: Timeouts,
    ack: AckGuard,
    output: OutputBuffer,
    hooks: Arc<dyn TaskHooks>,
    started_at: SystemTime,
    started: Instant,
}

impl Tracker {
    fn advance(&mut self, to: TaskStatus) -> bool {
        if !self.status.can_advance_to(to) {
            debug!(target: "farm.exec.task", task_id = %self.id, from = self.status.as_str(), to = to.as_str(), "transition ignored");
            return false;
        }
        debug!(target: "farm.exec.task", task_id = %self.id, from = self.status.as_str(), to = to.as_str(), "transition");
        self.status = to;
        true
    }

    async fn ack(&self) {
        if let Err(e) = self.ack.ack().await {
            warn!(target: "farm.exec.task", task_id = %self.id, error = %e, "message left unacknowledged");
        }
    }

    fn info(&self) -> TaskInfo {
        TaskInfo {
            task_id: self.id.clone(),
            callable_reference: self.reference.clone(),
            status: self.status,
            timeouts: self.timeouts,
            started_at: self.started_at,
            elapsed: self.started.elapsed(),
            output: self.output.clone(),
        }
    }

    async fn hook<F>(&self, name: &'static str, fut: F)
    where
        F: Future<Output = ()>,
    {
        if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
            warn!(target: "farm.exec.task", task_id = %self.id, hook = name, panic = %panic_message(panic.as_ref()), "task hook panicked");
        }
    }

    /// Waits for a hook started earlier in the run.
    async fn settle_hook(&self, name: &'static str, pending: &mut Option<PendingHook>) {
        if let Some(hook) = pending.take()
            && let Err(panic) = hook.await
        {
            warn!(target: "farm.exec.task", task_id = %self.id, hook = name, panic = %panic_message(panic.as_ref()), "task hook panicked");
        }
    }

    fn report(self, result: Option<Value>, error: Option<TaskError>) -> TaskReport {
        TaskReport {
            acked: self.ack.is_acked(),
            task_id: self.id,
            callable_reference: self.reference,
            status: self.status,
            result,
            error,
            started_at: self.started_at,
            finished_at: SystemTime::now(),
            output: self.output.entries(),
        }
    }
}

/// A delivered job on its way to a terminal status.
pub struct Task {
    tracker: Tracker,
    prepared: Result<(DecodedJob, Callable), TaskError>,
}

impl Task {
    /// Decodes the message, resolves its callable and its effective timeouts.
    ///
    /// Never fails: an undecodable message or an unknown callable yields a task that
    /// acknowledges and fails without running.
    pub fn intake(env: &TaskEnv, incoming: Incoming) -> Self {
        let timeouts = Timeouts::resolve(&incoming.headers, &env.defaults);
        let (reference, prepared) = match env.codec.decode(&incoming.body) {
            Err(e) => (String::new(), Err(TaskError::Malformed(e.to_string()))),
            Ok(job) => {
                let reference = job.callable_reference.clone();
                match env.registry.resolve(&reference) {
                    Ok(callable) => (reference, Ok((job, callable))),
                    Err(CoreError::UnresolvableCallable(name)) => {
                        (reference, Err(TaskError::Unresolvable(name)))
                    }
                    Err(e) => (reference, Err(TaskError::Malformed(e.to_string()))),
                }
            }
        };

        Self {
            tracker: Tracker {
                ack: AckGuard::new(incoming.task_id.clone(), incoming.acker),
                id: incoming.task_id,
                reference,
                status: TaskStatus::Pending,
                timeouts,
                output: OutputBuffer::new(env.output_capacity),
                hooks: env.hooks.clone(),
                started_at: SystemTime::now(),
                started: Instant::now(),
            },
            prepared,
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.tracker.id
    }

    #[inline]
    pub fn status(&self) -> TaskStatus {
        self.tracker.status
    }

    #[inline]
    pub fn timeouts(&self) -> Timeouts {
        self.tracker.timeouts
    }

    /// Drives the task to a terminal status.
    ///
    /// Returns as soon as the hard timeout fires, even if blocking work is still running on
    /// its thread; the caller is expected to treat such a report as stuck.
    pub async fn run(self) -> TaskReport {
        let Task {
            mut tracker,
            prepared,
        } = self;

        let (job, callable) = match prepared {
            Ok(ready) => ready,
            Err(error) => return reject(tracker, error).await,
        };

        tracker.advance(TaskStatus::Running);
        tracker.started_at = SystemTime::now();
        tracker.started = Instant::now();

        let cancel = CancellationToken::new();
        let ctx = TaskContext::new(
            tracker.id.clone(),
            job.context,
            cancel.clone(),
            tracker.output.clone(),
        );
        let call = Call::new(job.args, job.kwargs, ctx);

        // Span name must stay equal to `capture::TASK_SPAN_NAME`.
        let span = info_span!("farm_task", task_id = %tracker.id, callable = %tracker.reference);
        let registration = capture::register(tracker.id.clone(), tracker.output.clone());
        let mut work = launch(callable, call, span);

        let now = tokio::time::Instant::now();
        let soft_at = tracker.timeouts.soft().map(|d| now + d);
        let hard_at = now + tracker.timeouts.hard();
        let mut soft_fired = false;
        let mut soft_hook: Option<PendingHook> = None;

        let settled = loop {
            tokio::select! {
                biased;
                joined = &mut work => break Some(settle(joined)),
                _ = wait_until(soft_at), if !soft_fired => {
                    soft_fired = true;
                    tracker.advance(TaskStatus::SoftTimeout);
                    cancel.cancel();
                    work.abort();
                    warn!(target: "farm.exec.task", task_id = %tracker.id, callable = %tracker.reference, timeout = ?tracker.timeouts.soft(), "soft timeout reached");
                    tracker.ack().await;
                    let info = tracker.info();
                    let hooks = tracker.hooks.clone();
                    soft_hook = Some(Box::pin(
                        AssertUnwindSafe(async move { hooks.on_soft_timeout(&info).await }).catch_unwind(),
                    ));
                }
                _ = sleep_until(hard_at) => {
                    tracker.advance(TaskStatus::HardTimeout);
                    cancel.cancel();
                    work.abort();
                    warn!(target: "farm.exec.task", task_id = %tracker.id, callable = %tracker.reference, timeout = ?tracker.timeouts.hard(), "hard timeout reached");
                    tracker.ack().await;
                    if let Some(hook) = soft_hook.take() {
                        debug!(target: "farm.exec.task", task_id = %tracker.id, "on_soft_timeout still running; detached");
                        tokio::spawn(hook);
                    }
                    let info = tracker.info();
                    tracker.hook("on_hard_timeout", tracker.hooks.on_hard_timeout(&info)).await;
                    break None;
                }
                done = run_pending(&mut soft_hook) => {
                    soft_hook = None;
                    if let Err(panic) = done {
                        warn!(target: "farm.exec.task", task_id = %tracker.id, hook = "on_soft_timeout", panic = %panic_message(panic.as_ref()), "task hook panicked");
                    }
                }
            }
        };
        tracker.settle_hook("on_soft_timeout", &mut soft_hook).await;
        drop(registration);

        match (settled, tracker.status) {
            (Some(Ok(value)), TaskStatus::Running) => {
                tracker.advance(TaskStatus::Success);
                tracker.ack().await;
                let info = tracker.info();
                tracker.hook("on_done", tracker.hooks.on_done(&info)).await;
                tracker.hook("on_success", tracker.hooks.on_success(&info, &value)).await;
                debug!(target: "farm.exec.task", task_id = %info.task_id, elapsed = ?info.elapsed, "task succeeded");
                tracker.report(Some(value), None)
            }
            (Some(Err(error)), TaskStatus::Running) => {
                tracker.advance(TaskStatus::Failure);
                tracker.ack().await;
                let info = tracker.info();
                tracker.hook("on_done", tracker.hooks.on_done(&info)).await;
                tracker.hook("on_failure", tracker.hooks.on_failure(&info, &error)).await;
                warn!(target: "farm.exec.task", task_id = %info.task_id, callable = %info.callable_reference, error = %error, "task failed");
                tracker.report(None, Some(error))
            }
            (settled, _) => {
                if let Some(Ok(_)) = settled {
                    debug!(target: "farm.exec.task", task_id = %tracker.id, "result arrived after soft timeout; discarded");
                }
                let info = tracker.info();
                tracker.hook("on_done", tracker.hooks.on_done(&info)).await;
                tracker.report(None, None)
            }
        }
    }
}

async fn reject(mut tracker: Tracker, error: TaskError) -> TaskReport {
    warn!(target: "farm.exec.task", task_id = %tracker.id, callable = %tracker.reference, error = %error, "job rejected without running");
    tracker.ack().await;
    tracker.advance(TaskStatus::Failure);
    let info = tracker.info();
    tracker.hook("on_done", tracker.hooks.on_done(&info)).await;
    tracker.hook("on_failure", tracker.hooks.on_failure(&info, &error)).await;
    tracker.report(None, Some(error))
}

fn launch(callable: Callable, call: Call, span: Span) -> JoinHandle<CallResult> {
    match callable {
        Callable::Async(f) => tokio::spawn(f(call).instrument(span)),
        Callable::Blocking(f) => tokio::task::spawn_blocking(move || span.in_scope(|| f(call))),
    }
}

async fn wait_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn run_pending(hook: &mut Option<PendingHook>) -> std::thread::Result<()> {
    match hook {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

fn settle(joined: Result<CallResult, JoinError>) -> Result<Value, TaskError> {
    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TaskError::Call(e)),
        Err(e) if e.is_panic() => Err(TaskError::Call(CallError::Panicked(panic_message(
            e.into_panic().as_ref(),
        )))),
        Err(_) => Err(TaskError::Call(CallError::Cancelled)),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        return s.to_string();
    }
    if let Some(s) = panic.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}
