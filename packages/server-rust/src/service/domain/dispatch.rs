//! Dispatch domain service: runs synchronous handlers in-line and hands
//! asynchronous work to the broker.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use newsroute_core::{DispatchOutcome, NotificationPayload, Strategy};
use tower::Service;
use tracing::{debug, error, warn};

use crate::broker::BrokerClient;
use crate::handler::{call_guarded, HandlerRegistry};
use crate::service::operation::{
    service_names, Operation, OperationError, OperationResponse, Route,
};
use crate::service::registry::{ManagedService, ServiceContext};

/// Dispatcher over one handler registry and one broker.
///
/// Dispatch never waits for queued work; it returns as soon as the broker
/// has accepted the task. Nothing is retried here.
pub struct DispatchService {
    handlers: Arc<HandlerRegistry>,
    broker: Arc<dyn BrokerClient>,
}

impl DispatchService {
    #[must_use]
    pub fn new(handlers: Arc<HandlerRegistry>, broker: Arc<dyn BrokerClient>) -> Self {
        Self { handlers, broker }
    }

    /// Execute one classified notification.
    ///
    /// # Errors
    ///
    /// - `HandlerFailure` when a synchronous handler fails or panics
    /// - `QueueUnavailable` when the broker refuses or cannot be reached
    /// - `QueueSubmissionFailed` for any other submission error
    /// - `Internal` when the route names a handler that is not registered
    pub async fn dispatch(
        &self,
        route: &Route,
        payload: NotificationPayload,
    ) -> Result<DispatchOutcome, OperationError> {
        match route.strategy {
            Strategy::Synchronous => {
                let handler = self.handlers.get(&route.handler_id).ok_or_else(|| {
                    OperationError::Internal(anyhow::anyhow!(
                        "no handler registered for '{}'",
                        route.handler_id
                    ))
                })?;
                match call_guarded(handler.as_ref(), &payload).await {
                    Ok(value) => Ok(DispatchOutcome::Completed(value)),
                    Err(source) => {
                        error!(handler_id = %route.handler_id, error = %source, "handler failed");
                        Err(OperationError::HandlerFailure {
                            handler_id: route.handler_id.clone(),
                            source,
                        })
                    }
                }
            }
            Strategy::Asynchronous => match self.broker.submit(&route.handler_id, payload).await {
                Ok(task_id) => {
                    debug!(handler_id = %route.handler_id, task_id = %task_id, "task accepted");
                    Ok(DispatchOutcome::Accepted(task_id))
                }
                Err(e) if e.is_unavailable() => {
                    warn!(handler_id = %route.handler_id, error = %e, "broker unavailable");
                    Err(OperationError::QueueUnavailable(e.to_string()))
                }
                Err(e) => {
                    error!(handler_id = %route.handler_id, error = %e, "task submission failed");
                    Err(OperationError::QueueSubmissionFailed(e.to_string()))
                }
            },
        }
    }
}

#[async_trait]
impl ManagedService for DispatchService {
    fn name(&self) -> &'static str {
        service_names::DISPATCH
    }

    async fn init(&self, _ctx: &ServiceContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn reset(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn shutdown(&self, _terminate: bool) -> anyhow::Result<()> {
        Ok(())
    }
}

impl Service<Operation> for Arc<DispatchService> {
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let svc = Arc::clone(self);
        Box::pin(async move {
            match op {
                Operation::Dispatch { route, payload, .. } => svc
                    .dispatch(&route, payload)
                    .await
                    .map(OperationResponse::Dispatched),
                Operation::QueryStatus { .. } => Err(OperationError::WrongService),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use newsroute_core::{HandlerId, NativeTaskSnapshot, TaskId};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::broker::BrokerError;
    use crate::handler::{handler_fn, HandlerError};
    use crate::service::operation::OperationContext;

    /// Broker that answers `submit` with a canned result.
    struct CannedBroker {
        reply: fn() -> Result<TaskId, BrokerError>,
    }

    #[async_trait]
    impl BrokerClient for CannedBroker {
        async fn submit(
            &self,
            _handler_id: &HandlerId,
            _payload: NotificationPayload,
        ) -> Result<TaskId, BrokerError> {
            (self.reply)()
        }

        async fn query_state(
            &self,
            _task_id: &TaskId,
        ) -> Result<Option<NativeTaskSnapshot>, BrokerError> {
            Ok(None)
        }
    }

    fn service(reply: fn() -> Result<TaskId, BrokerError>) -> Arc<DispatchService> {
        let mut handlers = HandlerRegistry::new();
        handlers
            .register(
                "echo",
                Arc::new(handler_fn(|payload: NotificationPayload| async move {
                    Ok::<_, HandlerError>(payload.into_value())
                })),
            )
            .unwrap();
        handlers
            .register(
                "broken",
                Arc::new(handler_fn(|_payload| async {
                    Err::<Value, _>(HandlerError::Processing("missing headline".into()))
                })),
            )
            .unwrap();
        handlers
            .register(
                "panicky",
                Arc::new(handler_fn(|payload: NotificationPayload| async move {
                    if payload.sender().is_some() {
                        panic!("unexpected layout");
                    }
                    Ok::<_, HandlerError>(Value::Null)
                })),
            )
            .unwrap();
        Arc::new(DispatchService::new(
            Arc::new(handlers),
            Arc::new(CannedBroker { reply }),
        ))
    }

    fn route(handler: &str, strategy: Strategy) -> Route {
        Route {
            handler_id: HandlerId::new(handler),
            strategy,
        }
    }

    fn payload() -> NotificationPayload {
        NotificationPayload::new(json!({"metadata": {"sender": "a@b"}, "content": "X"}))
    }

    #[tokio::test]
    async fn synchronous_result_is_passed_through() {
        let svc = service(|| Ok(TaskId::new("unused")));
        let outcome = svc
            .dispatch(&route("echo", Strategy::Synchronous), payload())
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Completed(payload().into_value()));
    }

    #[tokio::test]
    async fn synchronous_error_is_handler_failure() {
        let svc = service(|| Ok(TaskId::new("unused")));
        let err = svc
            .dispatch(&route("broken", Strategy::Synchronous), payload())
            .await
            .unwrap_err();
        match err {
            OperationError::HandlerFailure { handler_id, source } => {
                assert_eq!(handler_id, HandlerId::new("broken"));
                assert_eq!(source.to_string(), "missing headline");
            }
            other => panic!("expected HandlerFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn synchronous_panic_is_handler_failure() {
        let svc = service(|| Ok(TaskId::new("unused")));
        let err = svc
            .dispatch(&route("panicky", Strategy::Synchronous), payload())
            .await
            .unwrap_err();
        match err {
            OperationError::HandlerFailure { handler_id, source } => {
                assert_eq!(handler_id, HandlerId::new("panicky"));
                assert!(matches!(source, HandlerError::Panicked(m) if m == "unexpected layout"));
            }
            other => panic!("expected HandlerFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn asynchronous_returns_broker_task_id() {
        let svc = service(|| Ok(TaskId::new("task-7")));
        let outcome = svc
            .dispatch(&route("echo", Strategy::Asynchronous), payload())
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Accepted(TaskId::new("task-7")));
    }

    #[tokio::test]
    async fn broker_unavailable_maps_to_queue_unavailable() {
        let svc = service(|| Err(BrokerError::Unavailable("connection refused".into())));
        let err = svc
            .dispatch(&route("echo", Strategy::Asynchronous), payload())
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::QueueUnavailable(_)));
    }

    #[tokio::test]
    async fn other_broker_errors_map_to_submission_failed() {
        let svc = service(|| Err(BrokerError::Rejected("too large".into())));
        let err = svc
            .dispatch(&route("echo", Strategy::Asynchronous), payload())
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::QueueSubmissionFailed(m) if m.contains("too large")));
    }

    #[tokio::test]
    async fn status_operation_is_wrong_service() {
        let svc = service(|| Ok(TaskId::new("unused")));
        let op = Operation::QueryStatus {
            ctx: OperationContext::new(1, service_names::STATUS, None),
            task_id: TaskId::new("t"),
        };
        let err = svc.oneshot(op).await.unwrap_err();
        assert!(matches!(err, OperationError::WrongService));
    }
}
