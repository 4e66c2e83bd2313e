use clap::{Args, Parser, Subcommand};
use serde_json::Value;

/// farmd - distributed task farm over AMQP
#[derive(Parser, Debug)]
#[command(name = "farmd")]
#[command(version)]
#[command(about = "Supervisor, worker and publisher of a distributed task farm", long_about = None)]
pub struct Cli {
    /// Broker URL (overrides FARM_BROKER_URL)
    #[arg(long = "broker-url", global = true)]
    pub broker_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a supervisor and its pool of workers
    Supervisor(SupervisorArgs),
    /// Run a single worker
    Worker(WorkerArgs),
    /// Publish jobs to the job queue
    Enqueue(EnqueueArgs),
    /// List the callables this binary can run
    Callables,
}

#[derive(Args, Debug)]
pub struct SupervisorArgs {
    /// Minimum number of workers (overrides FARM_MIN_WORKERS)
    #[arg(long = "min-workers")]
    pub min_workers: Option<usize>,

    /// Maximum number of workers (overrides FARM_MAX_WORKERS)
    #[arg(long = "max-workers")]
    pub max_workers: Option<usize>,

    /// Dashboard listen address, e.g. 127.0.0.1:8080 (overrides FARM_DASHBOARD_ADDR)
    #[arg(long = "dashboard")]
    pub dashboard: Option<String>,
}

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Supervisor this worker reports to; standalone when absent
    #[arg(long = "manager-id")]
    pub manager_id: Option<String>,
}

#[derive(Args, Debug)]
pub struct EnqueueArgs {
    /// Callable reference, see `farmd callables`
    pub callable: String,

    /// Positional argument as JSON (plain text is sent as a string); repeatable
    #[arg(long = "arg", value_parser = parse_value)]
    pub args: Vec<Value>,

    /// Keyword argument as name=JSON; repeatable
    #[arg(long = "kwarg", value_parser = parse_kwarg)]
    pub kwargs: Vec<(String, Value)>,

    /// Soft timeout in seconds for these jobs
    #[arg(long = "soft-timeout")]
    pub soft_timeout_s: Option<u64>,

    /// Hard timeout in seconds for these jobs
    #[arg(long = "hard-timeout")]
    pub hard_timeout_s: Option<u64>,

    /// How many identical jobs to publish
    #[arg(long = "count", default_value = "1")]
    pub count: usize,
}

fn parse_value(raw: &str) -> Result<Value, String> {
    Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
}

fn parse_kwarg(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got `{raw}`"))?;
    if name.trim().is_empty() {
        return Err(format!("empty keyword name in `{raw}`"));
    }
    Ok((name.trim().to_string(), parse_value(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn worker_takes_manager_id() {
        let cli = Cli::try_parse_from(["farmd", "worker", "--manager-id", "manager_1_2"]).unwrap();
        match cli.command {
            Command::Worker(w) => assert_eq!(w.manager_id.as_deref(), Some("manager_1_2")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn enqueue_parses_json_arguments() {
        let cli = Cli::try_parse_from([
            "farmd",
            "--broker-url",
            "amqp://localhost",
            "enqueue",
            "farmd::jobs::add",
            "--arg",
            "2",
            "--arg",
            "hello",
            "--kwarg",
            "scale={\"x\":1}",
            "--hard-timeout",
            "5",
        ])
        .unwrap();
        assert_eq!(cli.broker_url.as_deref(), Some("amqp://localhost"));
        let Command::Enqueue(e) = cli.command else {
            panic!("expected enqueue");
        };
        assert_eq!(e.args, vec![json!(2), json!("hello")]);
        assert_eq!(e.kwargs, vec![("scale".to_string(), json!({"x": 1}))]);
        assert_eq!((e.soft_timeout_s, e.hard_timeout_s, e.count), (None, Some(5), 1));
    }

    #[test]
    fn malformed_kwarg_is_rejected() {
        assert!(Cli::try_parse_from(["farmd", "enqueue", "x", "--kwarg", "novalue"]).is_err());
        assert!(Cli::try_parse_from(["farmd", "enqueue", "x", "--kwarg", "=1"]).is_err());
    }
}
