//! Callables shipped with `farmd`.
use std::time::Duration;

use farm_core::{Call, CallError, CallableRegistry, CoreError, registry::CallResult};
use serde_json::json;
use tracing::info;

/// Registry with every demo callable, each under its type path.
pub fn registry() -> Result<CallableRegistry, CoreError> {
    let registry = CallableRegistry::new();
    registry.register_async_fn(add)?;
    registry.register_async_fn(echo)?;
    registry.register_async_fn(fail)?;
    registry.register_async_fn(sleep_for)?;
    registry.register_blocking_fn(crunch)?;
    Ok(registry)
}

pub async fn add(call: Call) -> CallResult {
    let a: f64 = call.arg(0)?;
    let b: f64 = call.arg(1)?;
    Ok(json!(a + b))
}

pub async fn echo(call: Call) -> CallResult {
    Ok(json!({
        "task_id": call.context().task_id(),
        "args": call.args(),
        "kwargs": call.kwargs(),
    }))
}

pub async fn fail(call: Call) -> CallResult {
    let reason: Option<String> = call.kwarg_opt("reason")?;
    Err(CallError::failed(reason.unwrap_or_else(|| "requested failure".into())))
}

/// Sleeps for `args[0]` seconds, stopping early when the task is cancelled.
pub async fn sleep_for(call: Call) -> CallResult {
    let secs: f64 = call.arg(0)?;
    let ctx = call.context();
    ctx.out(format!("sleeping {secs}s"));
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs_f64(secs.max(0.0))) => Ok(json!(secs)),
        _ = ctx.cancel_token().cancelled() => Err(CallError::Cancelled),
    }
}

/// Blocking work: `args[0]` rounds of 100ms, checking for cancellation between rounds.
pub fn crunch(call: Call) -> CallResult {
    let rounds: u64 = call.arg(0)?;
    for round in 0..rounds {
        if call.context().is_cancelled() {
            return Err(CallError::Cancelled);
        }
        std::thread::sleep(Duration::from_millis(100));
        if round % 10 == 9 {
            info!(target: "farm.jobs", round = round + 1, "crunching");
        }
    }
    Ok(json!(rounds))
}
