//! Broker port: the capability to enqueue a notification for background
//! handling and later read back its state.
//!
//! The dispatcher and the status resolver only see [`BrokerClient`]. The
//! crate ships one implementation, [`MemoryBroker`], which executes queued
//! work on in-process background workers.

pub mod memory;
pub mod record;

use async_trait::async_trait;
use newsroute_core::{HandlerId, NativeTaskSnapshot, NotificationPayload, TaskId};

pub use memory::MemoryBroker;
pub use record::TaskRecord;

/// Errors reported by a broker.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The broker cannot be reached or is refusing work right now.
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    /// The broker is up but will not accept this particular task.
    #[error("broker rejected task: {0}")]
    Rejected(String),
    #[error("task encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BrokerError {
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Client side of a task broker. Shared by all requests.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Hand `(handler_id, payload)` to the broker and return its task id.
    /// Must not wait for the task to run.
    async fn submit(
        &self,
        handler_id: &HandlerId,
        payload: NotificationPayload,
    ) -> Result<TaskId, BrokerError>;

    /// Current native state of `task_id`. `None` when the broker has no
    /// record of it. Never mutates task state.
    async fn query_state(&self, task_id: &TaskId)
        -> Result<Option<NativeTaskSnapshot>, BrokerError>;

    /// Tasks accepted but not yet picked up, when the broker can tell.
    fn queue_depth(&self) -> Option<usize> {
        None
    }
}
