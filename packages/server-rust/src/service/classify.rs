//! Submission classification: converts a raw request body into a typed `Operation`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use newsroute_core::{validate_body, ClassificationTable, Strategy, TaskId};
use tracing::{debug, warn};

use super::config::ServerConfig;
use super::operation::{service_names, ClassifyError, Operation, OperationContext, Route};

// ---------------------------------------------------------------------------
// OperationService
// ---------------------------------------------------------------------------

/// Validates and classifies incoming notifications into `Operation` values.
///
/// Holds the immutable classification table; every call is lock-free and
/// safe from any number of request tasks. Each operation receives a unique
/// call ID.
pub struct OperationService {
    table: Arc<ClassificationTable>,
    config: Arc<ServerConfig>,
    call_id_counter: AtomicU64,
}

impl OperationService {
    #[must_use]
    pub fn new(table: Arc<ClassificationTable>, config: Arc<ServerConfig>) -> Self {
        Self {
            table,
            config,
            call_id_counter: AtomicU64::new(1),
        }
    }

    /// Generate a unique call ID for each operation.
    fn next_call_id(&self) -> u64 {
        self.call_id_counter.fetch_add(1, Ordering::Relaxed)
    }

    #[must_use]
    pub fn table(&self) -> &ClassificationTable {
        &self.table
    }

    /// Validate a submission body and classify it by sender.
    ///
    /// Synchronous routes carry the configured handler timeout; asynchronous
    /// routes only hand work to the broker and carry none.
    ///
    /// # Errors
    ///
    /// - `ClassifyError::Validation` for malformed bodies or missing fields
    /// - `ClassifyError::Classification` when no rule matches the sender
    pub fn classify_submission(&self, body: &[u8]) -> Result<Operation, ClassifyError> {
        let notification = validate_body(body)?;
        debug!(
            sender = notification.sender(),
            payload = %notification.payload().as_value(),
            "notification received"
        );

        let rule = match self.table.classify(notification.sender()) {
            Ok(rule) => rule,
            Err(e) => {
                warn!(sender = notification.sender(), "unknown newsletter source");
                return Err(e.into());
            }
        };

        let route = Route {
            handler_id: rule.handler_id.clone(),
            strategy: rule.strategy,
        };
        let timeout_ms = match route.strategy {
            Strategy::Synchronous => self.config.handler_timeout_ms,
            Strategy::Asynchronous => None,
        };
        let ctx = OperationContext::new(self.next_call_id(), service_names::DISPATCH, timeout_ms);
        let (sender, payload) = notification.into_parts();

        debug!(
            call_id = ctx.call_id,
            sender = %sender,
            handler_id = %route.handler_id,
            strategy = route.strategy.as_str(),
            "notification classified"
        );
        Ok(Operation::Dispatch {
            ctx,
            route,
            sender,
            payload,
        })
    }

    /// Build a status query for `task_id`.
    #[must_use]
    pub fn status_query(&self, task_id: TaskId) -> Operation {
        Operation::QueryStatus {
            ctx: OperationContext::new(self.next_call_id(), service_names::STATUS, None),
            task_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
