mod cli;
mod dashboard;
mod jobs;

use std::sync::Arc;

use clap::Parser;
use farm_broker::Publisher;
use farm_core::{FarmConfig, JobRequest};
use farm_observe::{LoggerConfig, TaskJournal, logger_init};
use farm_prometheus::PrometheusMetrics;
use farm_runtime::{ExeSpawner, Supervisor, Worker, WorkerExit};
use tracing::{info, warn};

use crate::cli::{Cli, Command, EnqueueArgs, SupervisorArgs, WorkerArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log = LoggerConfig::from_env()?;
    logger_init(&log)?;

    let mut cfg = FarmConfig::from_env()?;
    if let Some(url) = cli.broker_url {
        cfg.broker_url = url;
    }

    match cli.command {
        Command::Supervisor(args) => run_supervisor(cfg, args).await,
        Command::Worker(args) => run_worker(cfg, args).await,
        Command::Enqueue(args) => enqueue(cfg, args).await,
        Command::Callables => {
            for name in jobs::registry()?.names() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

async fn run_supervisor(mut cfg: FarmConfig, args: SupervisorArgs) -> anyhow::Result<()> {
    if let Some(min) = args.min_workers {
        cfg.min_workers = min;
    }
    if let Some(max) = args.max_workers {
        cfg.max_workers = max;
    }
    if args.dashboard.is_some() {
        cfg.dashboard_addr = args.dashboard;
    }

    let metrics = Arc::new(PrometheusMetrics::new()?);
    let spawner = Arc::new(ExeSpawner::current_exe()?);
    let supervisor = Supervisor::new(cfg.clone(), spawner, metrics)?;
    let handle = supervisor.handle();

    let dashboard = match cfg.dashboard_addr.as_deref() {
        Some(addr) => Some(dashboard::spawn(addr, handle.clone()).await?),
        None => None,
    };

    let res = supervisor.run().await;
    handle.request_shutdown();
    if let Some(task) = dashboard
        && let Err(e) = task.await
    {
        warn!(target: "farm.dashboard", error = %e, "dashboard task failed");
    }
    Ok(res?)
}

async fn run_worker(mut cfg: FarmConfig, args: WorkerArgs) -> anyhow::Result<()> {
    if args.manager_id.is_some() {
        cfg.manager_id = args.manager_id;
    }

    let worker = Worker::new(cfg, jobs::registry()?).with_hooks(Arc::new(TaskJournal));
    match worker.run().await? {
        WorkerExit::Drained => Ok(()),
        WorkerExit::GraceElapsed { abandoned } => {
            warn!(target: "farm.worker", abandoned, "exiting with tasks still running");
            // blocking tasks would otherwise hold the runtime open
            std::process::exit(0)
        }
    }
}

async fn enqueue(cfg: FarmConfig, args: EnqueueArgs) -> anyhow::Result<()> {
    let mut req = JobRequest::new(args.callable).args(args.args);
    for (name, value) in args.kwargs {
        req = req.kwarg(name, value);
    }
    if let Some(secs) = args.soft_timeout_s {
        req = req.soft_timeout_s(secs);
    }
    if let Some(secs) = args.hard_timeout_s {
        req = req.hard_timeout_s(secs);
    }

    let publisher = Publisher::new(&cfg);
    for _ in 0..args.count.max(1) {
        publisher.publish(&req).await?;
    }
    info!(target: "farm.publisher", callable = req.callable_reference(), count = args.count.max(1), "jobs published");
    Ok(())
}
