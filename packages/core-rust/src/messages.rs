//! Wire messages: HTTP response bodies and the broker task envelope.
//!
//! HTTP bodies are plain JSON with `snake_case` fields. The broker envelope
//! is `MsgPack`-encoded via `rmp_serde::to_vec_named()` so field names survive
//! the trip through the queue.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classify::HandlerId;
use crate::payload::NotificationPayload;
use crate::task::{TaskId, TaskState, TaskStatus};

// ---------------------------------------------------------------------------
// HTTP bodies
// ---------------------------------------------------------------------------

/// `202 Accepted` body for queued notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitAccepted {
    pub task_id: String,
}

impl From<TaskId> for SubmitAccepted {
    fn from(task_id: TaskId) -> Self {
        Self {
            task_id: task_id.as_str().to_string(),
        }
    }
}

/// Status endpoint body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusBody {
    pub state: TaskState,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl From<TaskStatus> for TaskStatusBody {
    fn from(status: TaskStatus) -> Self {
        Self {
            state: status.state,
            status: status.status,
            result: status.result,
        }
    }
}

/// Error body for every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
    /// Stable machine-readable code (e.g. `unknown_source`).
    pub kind: String,
}

// ---------------------------------------------------------------------------
// Broker envelope
// ---------------------------------------------------------------------------

/// Unit of work placed on the broker queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task_id: TaskId,
    pub handler_id: HandlerId,
    pub payload: NotificationPayload,
}

impl TaskMessage {
    /// Encode as named-field `MsgPack`.
    ///
    /// # Errors
    ///
    /// Returns the encoder error if the payload cannot be represented.
    pub fn encode(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec_named(self)
    }

    /// Decode from `MsgPack` bytes produced by [`TaskMessage::encode`].
    ///
    /// # Errors
    ///
    /// Returns the decoder error for truncated or foreign bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
