//! Task lifecycle: identifiers, normalized states, and broker-state normalization.
//!
//! The broker reports tasks in its own vocabulary ([`NativeState`]). The
//! router never exposes that vocabulary; [`TaskStatus::normalize`] folds it
//! into the four-state [`TaskState`] lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// TaskId
// ---------------------------------------------------------------------------

/// Opaque identifier handed out by the broker on submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// TaskState
// ---------------------------------------------------------------------------

/// Normalized task lifecycle.
///
/// State machine: Pending -> Running -> (Succeeded | Failed). Terminal
/// states never transition again. Wire names follow the status endpoint
/// contract (`PENDING`, `STARTED`, `SUCCESS`, `FAILURE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "STARTED")]
    Running,
    #[serde(rename = "SUCCESS")]
    Succeeded,
    #[serde(rename = "FAILURE")]
    Failed,
}

/// Attempted a transition the lifecycle does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid task transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: TaskState,
    pub to: TaskState,
}

impl TaskState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Wire name used by the status endpoint.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "STARTED",
            Self::Succeeded => "SUCCESS",
            Self::Failed => "FAILURE",
        }
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running) | (Self::Running, Self::Succeeded | Self::Failed)
        )
    }

    /// Validate a forward transition.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError` for backward moves, self-loops, skipped
    /// steps, and any move out of a terminal state.
    pub fn transition(self, next: Self) -> Result<Self, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// NativeState / NativeTaskSnapshot
// ---------------------------------------------------------------------------

/// Task state in the broker's own vocabulary.
///
/// Covers the common result-backend states; anything unrecognized is kept
/// verbatim in `Other` and treated as not yet started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeState {
    Pending,
    Received,
    Started,
    Progress,
    Retry,
    Success,
    Failure,
    Revoked,
    Other(String),
}

impl NativeState {
    /// Parse a broker state name, case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "PENDING" | "QUEUED" => Self::Pending,
            "RECEIVED" => Self::Received,
            "STARTED" | "RUNNING" | "IN_PROGRESS" => Self::Started,
            "PROGRESS" => Self::Progress,
            "RETRY" => Self::Retry,
            "SUCCESS" | "SUCCEEDED" => Self::Success,
            "FAILURE" | "FAILED" => Self::Failure,
            "REVOKED" => Self::Revoked,
            _ => Self::Other(name.to_string()),
        }
    }

    /// Fold the native state into the normalized lifecycle.
    #[must_use]
    pub fn normalized(&self) -> TaskState {
        match self {
            Self::Pending | Self::Received | Self::Other(_) => TaskState::Pending,
            Self::Started | Self::Progress | Self::Retry => TaskState::Running,
            Self::Success => TaskState::Succeeded,
            Self::Failure | Self::Revoked => TaskState::Failed,
        }
    }
}

impl From<&str> for NativeState {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

/// What the broker reports for a task at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeTaskSnapshot {
    pub state: NativeState,
    /// Final value for successful tasks.
    pub result: Option<Value>,
    /// Progress metadata while running, failure descriptor when failed.
    /// May be structured or free text.
    pub info: Option<Value>,
}

impl NativeTaskSnapshot {
    #[must_use]
    pub fn new(state: impl Into<NativeState>) -> Self {
        Self {
            state: state.into(),
            result: None,
            info: None,
        }
    }

    #[must_use]
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    #[must_use]
    pub fn with_info(mut self, info: Value) -> Self {
        self.info = Some(info);
        self
    }
}

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// Normalized answer to a status query.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    /// Human-readable status line (progress text or failure descriptor).
    pub status: String,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl TaskStatus {
    /// Normalize a broker snapshot. `None` means the broker does not know the
    /// id, which is reported as pending.
    #[must_use]
    pub fn normalize(task_id: TaskId, snapshot: Option<NativeTaskSnapshot>) -> Self {
        let Some(snapshot) = snapshot else {
            return Self::pending(task_id);
        };

        match snapshot.state.normalized() {
            TaskState::Pending => Self::pending(task_id),
            TaskState::Running => Self {
                task_id,
                state: TaskState::Running,
                status: snapshot
                    .info
                    .as_ref()
                    .and_then(progress_text)
                    .unwrap_or_else(|| "Task is running".to_string()),
                result: None,
                error: None,
            },
            TaskState::Succeeded => Self {
                task_id,
                state: TaskState::Succeeded,
                status: snapshot
                    .info
                    .as_ref()
                    .and_then(progress_text)
                    .unwrap_or_else(|| "Task completed".to_string()),
                result: Some(snapshot.result.unwrap_or(Value::Null)),
                error: None,
            },
            TaskState::Failed => {
                let descriptor = failure_text(snapshot.info.as_ref(), &snapshot.state);
                Self {
                    task_id,
                    state: TaskState::Failed,
                    status: descriptor.clone(),
                    result: None,
                    error: Some(descriptor),
                }
            }
        }
    }

    fn pending(task_id: TaskId) -> Self {
        Self {
            task_id,
            state: TaskState::Pending,
            status: "Task is pending".to_string(),
            result: None,
            error: None,
        }
    }
}

/// Progress line from running-task metadata: a bare string or a `status` field.
fn progress_text(info: &Value) -> Option<String> {
    match info {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Object(fields) => fields
            .get("status")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Failure descriptor. Structured errors contribute their message field; any
/// other shape falls back to its textual form.
fn failure_text(info: Option<&Value>, state: &NativeState) -> String {
    match info {
        Some(Value::String(text)) if !text.is_empty() => text.clone(),
        Some(Value::Object(fields)) => ["exc_message", "message", "error"]
            .iter()
            .find_map(|key| fields.get(*key).and_then(Value::as_str))
            .map_or_else(|| Value::Object(fields.clone()).to_string(), str::to_string),
        Some(Value::Null | Value::String(_)) | None => match state {
            NativeState::Revoked => "Task was revoked".to_string(),
            _ => "Task failed".to_string(),
        },
        Some(other) => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
