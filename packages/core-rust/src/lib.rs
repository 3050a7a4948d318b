//! newsroute core: notification validation, sender classification, task lifecycle and wire messages.

pub mod classify;
pub mod messages;
pub mod outcome;
pub mod payload;
pub mod task;

pub use classify::{
    ClassificationError, ClassificationRule, ClassificationTable, HandlerId, RuleTableError,
    Strategy,
};
pub use messages::{ErrorBody, SubmitAccepted, TaskMessage, TaskStatusBody};
pub use outcome::DispatchOutcome;
pub use payload::{
    validate_body, validate_document, NotificationPayload, ValidatedNotification, ValidationError,
};
pub use task::{NativeState, NativeTaskSnapshot, TaskId, TaskState, TaskStatus, TransitionError};
