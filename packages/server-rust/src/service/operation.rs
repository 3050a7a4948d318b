//! Typed operations flowing through the pipeline, their responses, and errors.

use newsroute_core::{
    ClassificationError, DispatchOutcome, HandlerId, NotificationPayload, Strategy, TaskId,
    TaskStatus, ValidationError,
};

use crate::handler::HandlerError;

/// Service names used for routing operations to domain services.
pub mod service_names {
    pub const DISPATCH: &str = "dispatch";
    pub const STATUS: &str = "status";
}

// ---------------------------------------------------------------------------
// OperationContext
// ---------------------------------------------------------------------------

/// Context carried with every operation through the pipeline.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub call_id: u64,
    pub service_name: &'static str,
    /// Wall-clock ceiling enforced by `TimeoutLayer`. `None` disables it.
    pub call_timeout_ms: Option<u64>,
}

impl OperationContext {
    #[must_use]
    pub fn new(call_id: u64, service_name: &'static str, call_timeout_ms: Option<u64>) -> Self {
        Self {
            call_id,
            service_name,
            call_timeout_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// Classification result: which handler owns the notification and how it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub handler_id: HandlerId,
    pub strategy: Strategy,
}

/// Typed operation variants dispatched through the pipeline.
#[derive(Debug)]
pub enum Operation {
    /// Run or enqueue a classified notification.
    Dispatch {
        ctx: OperationContext,
        route: Route,
        sender: String,
        payload: NotificationPayload,
    },
    /// Resolve the normalized status of a queued task.
    QueryStatus {
        ctx: OperationContext,
        task_id: TaskId,
    },
}

impl Operation {
    #[must_use]
    pub fn ctx(&self) -> &OperationContext {
        match self {
            Self::Dispatch { ctx, .. } | Self::QueryStatus { ctx, .. } => ctx,
        }
    }
}

/// Successful response from an operation handler.
#[derive(Debug)]
pub enum OperationResponse {
    Dispatched(DispatchOutcome),
    Status(TaskStatus),
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by operation handlers and middleware.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// The synchronous handler reported a processing error. Never retried.
    #[error("handler '{handler_id}' failed: {source}")]
    HandlerFailure {
        handler_id: HandlerId,
        #[source]
        source: HandlerError,
    },
    #[error("handler timed out after {timeout_ms}ms")]
    HandlerTimeout { timeout_ms: u64 },
    /// Broker unreachable or refusing work. Retryable by the caller.
    #[error("task queue unavailable: {0}")]
    QueueUnavailable(String),
    #[error("task submission failed: {0}")]
    QueueSubmissionFailed(String),
    /// Broker unreachable while resolving status. Distinct from a failed task.
    #[error("task status query failed: {0}")]
    StatusQueryFailed(String),
    #[error("unknown service: {name}")]
    UnknownService { name: String },
    #[error("server overloaded, try again later")]
    Overloaded,
    #[error("wrong service for operation")]
    WrongService,
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl OperationError {
    /// Stable machine-readable code.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HandlerFailure { .. } => "handler_failure",
            Self::HandlerTimeout { .. } => "handler_timeout",
            Self::QueueUnavailable(_) => "queue_unavailable",
            Self::QueueSubmissionFailed(_) => "queue_submission_failed",
            Self::StatusQueryFailed(_) => "status_query_failed",
            Self::UnknownService { .. } => "unknown_service",
            Self::Overloaded => "overloaded",
            Self::WrongService => "wrong_service",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the caller may reasonably retry the same request later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::QueueUnavailable(_) | Self::StatusQueryFailed(_) | Self::Overloaded
        )
    }
}

/// Errors from turning a raw submission into an `Operation`. All are
/// client-caused and permanent.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Classification(#[from] ClassificationError),
}

impl ClassifyError {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.kind(),
            Self::Classification(e) => e.kind(),
        }
    }
}
