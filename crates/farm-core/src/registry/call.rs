use std::fmt;

use farm_model::{ContextSnapshot, OutputEntry};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::capture::OutputBuffer;

/// Failure reported by a callable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("missing positional argument #{0}")]
    MissingArg(usize),
    #[error("missing keyword argument `{0}`")]
    MissingKwarg(String),
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArg { name: String, reason: String },
    #[error("{0}")]
    Failed(String),
    #[error("callable panicked: {0}")]
    Panicked(String),
    #[error("cancelled")]
    Cancelled,
}

impl CallError {
    pub fn failed(reason: impl fmt::Display) -> Self {
        CallError::Failed(reason.to_string())
    }
}

/// What a running callable sees of its task.
///
/// Cloning is cheap; clones share the cancellation token and the output buffer.
#[derive(Clone, Debug)]
pub struct TaskContext {
    task_id: String,
    snapshot: ContextSnapshot,
    cancel: CancellationToken,
    output: OutputBuffer,
}

impl TaskContext {
    pub fn new(
        task_id: impl Into<String>,
        snapshot: ContextSnapshot,
        cancel: CancellationToken,
        output: OutputBuffer,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            snapshot,
            cancel,
            output,
        }
    }

    /// Context for running a callable outside a worker (tests, local invocation).
    pub fn detached(task_id: impl Into<String>) -> Self {
        Self::new(
            task_id,
            ContextSnapshot::default(),
            CancellationToken::new(),
            OutputBuffer::new(64),
        )
    }

    #[inline]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Ambient state restored from the publisher.
    #[inline]
    pub fn snapshot(&self) -> &ContextSnapshot {
        &self.snapshot
    }

    /// Fires when a watchdog gives up on the task.
    ///
    /// Blocking callables keep running after a timeout; long loops should poll this.
    #[inline]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Writes a line to the task's captured standard output.
    pub fn out(&self, line: impl Into<String>) {
        self.output.push(OutputEntry::console_out(line));
    }

    /// Writes a line to the task's captured standard error.
    pub fn err(&self, line: impl Into<String>) {
        self.output.push(OutputEntry::console_err(line));
    }
}

/// Arguments of a single invocation.
#[derive(Clone, Debug)]
pub struct Call {
    args: Vec<Value>,
    kwargs: Map<String, Value>,
    ctx: TaskContext,
}

impl Call {
    pub fn new(args: Vec<Value>, kwargs: Map<String, Value>, ctx: TaskContext) -> Self {
        Self { args, kwargs, ctx }
    }

    #[inline]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    #[inline]
    pub fn kwargs(&self) -> &Map<String, Value> {
        &self.kwargs
    }

    #[inline]
    pub fn context(&self) -> &TaskContext {
        &self.ctx
    }

    /// Positional argument `index`, deserialized as `T`.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, CallError> {
        let raw = self.args.get(index).ok_or(CallError::MissingArg(index))?;
        serde_json::from_value(raw.clone()).map_err(|e| CallError::InvalidArg {
            name: format!("#{index}"),
            reason: e.to_string(),
        })
    }

    /// Keyword argument `name`, deserialized as `T`.
    pub fn kwarg<T: DeserializeOwned>(&self, name: &str) -> Result<T, CallError> {
        self.kwarg_opt(name)?
            .ok_or_else(|| CallError::MissingKwarg(name.to_string()))
    }

    /// Keyword argument `name` if present.
    pub fn kwarg_opt<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, CallError> {
        match self.kwargs.get(name) {
            None => Ok(None),
            Some(raw) => serde_json::from_value(raw.clone())
                .map(Some)
                .map_err(|e| CallError::InvalidArg {
                    name: name.to_string(),
                    reason: e.to_string(),
                }),
        }
    }
}
