//! Task lifecycle states.

use std::fmt;

/// State of a running (or finished) task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    Suspended,
    Cancelling,
    Cancelled,
    Completed,
    Failed,
}

impl TaskState {
    /// Terminal states are final; no transition leaves them.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Cancelled | TaskState::Failed
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Idle => "idle",
            TaskState::Running => "running",
            TaskState::Suspended => "suspended",
            TaskState::Cancelling => "cancelling",
            TaskState::Cancelled => "cancelled",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Static description of a registered task.
#[derive(Clone, Debug, Default)]
pub struct TaskInfo {
    pub name: String,
    pub suspendable: bool,
    pub cancelable: bool,
    pub singleton: bool,
    pub description: String,
}
