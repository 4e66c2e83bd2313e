use serde::{Deserialize, Serialize};

/// Execution state of a task inside a worker.
///
/// ```text
/// pending ──► running ──► success
///                    ├──► failure
///                    ├──► soft_timeout ──► hard_timeout
///                    └──► hard_timeout
/// ```
/// A task whose callable cannot be resolved goes straight from `pending` to `failure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Message received, callable not started yet.
    Pending,
    /// Callable is executing.
    Running,
    /// Callable returned before any watchdog fired.
    Success,
    /// Callable returned an error (or could not be started at all).
    Failure,
    /// Soft watchdog fired; cooperative cancellation was requested.
    SoftTimeout,
    /// Hard watchdog fired; acknowledgment was forced.
    HardTimeout,
}

impl TaskStatus {
    /// Returns `true` if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success
                | TaskStatus::Failure
                | TaskStatus::SoftTimeout
                | TaskStatus::HardTimeout
        )
    }

    /// Returns `true` if `next` is a legal successor of `self`.
    ///
    /// The only move out of a terminal state is the escalation `soft_timeout → hard_timeout`.
    pub fn can_advance_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failure)
                | (Running, Success)
                | (Running, Failure)
                | (Running, SoftTimeout)
                | (Running, HardTimeout)
                | (SoftTimeout, HardTimeout)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failure => "failure",
            TaskStatus::SoftTimeout => "soft_timeout",
            TaskStatus::HardTimeout => "hard_timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(TaskStatus::Success.is_terminal());
        assert!(TaskStatus::Failure.is_terminal());
        assert!(TaskStatus::SoftTimeout.is_terminal());
        assert!(TaskStatus::HardTimeout.is_terminal());

        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn transitions_only_move_forward() {
        use TaskStatus::*;
        assert!(Pending.can_advance_to(Running));
        assert!(Running.can_advance_to(Success));
        assert!(SoftTimeout.can_advance_to(HardTimeout));

        assert!(!Running.can_advance_to(Pending));
        assert!(!Success.can_advance_to(Failure));
        assert!(!HardTimeout.can_advance_to(SoftTimeout));
        assert!(!Pending.can_advance_to(Success));
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&TaskStatus::SoftTimeout).unwrap();
        assert_eq!(json, r#""soft_timeout""#);

        let back: TaskStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TaskStatus::SoftTimeout);
    }
}
