//! Task status domain service: resolves a task id into a normalized status.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use newsroute_core::{TaskId, TaskStatus};
use tower::Service;
use tracing::warn;

use crate::broker::BrokerClient;
use crate::service::operation::{service_names, Operation, OperationError, OperationResponse};
use crate::service::registry::{ManagedService, ServiceContext};

/// Read-only view of task state through the broker.
pub struct TaskStatusService {
    broker: Arc<dyn BrokerClient>,
}

impl TaskStatusService {
    #[must_use]
    pub fn new(broker: Arc<dyn BrokerClient>) -> Self {
        Self { broker }
    }

    /// Resolve `task_id`. Unknown ids report as pending. Never mutates state.
    ///
    /// # Errors
    ///
    /// `StatusQueryFailed` when the broker query itself fails.
    pub async fn resolve(&self, task_id: TaskId) -> Result<TaskStatus, OperationError> {
        match self.broker.query_state(&task_id).await {
            Ok(snapshot) => Ok(TaskStatus::normalize(task_id, snapshot)),
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "task status query failed");
                Err(OperationError::StatusQueryFailed(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl ManagedService for TaskStatusService {
    fn name(&self) -> &'static str {
        service_names::STATUS
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

impl Service<Operation> for Arc<TaskStatusService> {
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
                Operation::QueryStatus { task_id, .. } => {
                    svc.resolve(task_id).await.map(OperationResponse::Status)
                }
                Operation::Dispatch { .. } => Err(OperationError::WrongService),
            }
        })
    }
}
