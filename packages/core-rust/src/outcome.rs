use serde_json::Value;

use crate::task::TaskId;

/// Result of dispatching one classified notification.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Synchronous path: the handler's return value. Terminal.
    Completed(Value),
    /// Asynchronous path: the broker accepted the work; poll this id.
    Accepted(TaskId),
}

impl DispatchOutcome {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    #[must_use]
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Self::Accepted(task_id) => Some(task_id),
            Self::Completed(_) => None,
        }
    }
}
