//! Tower middleware for the operation pipeline, outermost first:
//! load shedding, per-operation timeout, timing/outcome spans.

pub mod load_shed;
pub mod metrics;
pub mod pipeline;
pub mod timeout;

use std::future::Future;
use std::pin::Pin;

pub use load_shed::LoadShedLayer;
pub use metrics::MetricsLayer;
pub use pipeline::{build_operation_pipeline, OperationPipeline, SharedPipeline};
pub use timeout::TimeoutLayer;

use crate::service::operation::{OperationError, OperationResponse};

/// Boxed future returned by every layer in the pipeline.
pub type OperationFuture =
    Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

#[cfg(test)]
pub(crate) mod stub {
    use std::task::{Context, Poll};
    use std::time::Duration;

    use newsroute_core::{TaskId, TaskStatus};
    use tower::Service;

    use super::OperationFuture;
    use crate::service::operation::{
        service_names, Operation, OperationContext, OperationError, OperationResponse,
    };

    /// Answers status queries as pending after `delay_ms`. Any other
    /// operation gets `WrongService`.
    #[derive(Clone, Copy)]
    pub(crate) struct SlowStatus {
        pub delay_ms: u64,
    }

    impl Service<Operation> for SlowStatus {
        type Response = OperationResponse;
        type Error = OperationError;
        type Future = OperationFuture;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, op: Operation) -> Self::Future {
            let delay = Duration::from_millis(self.delay_ms);
            let Operation::QueryStatus { task_id, .. } = op else {
                return Box::pin(async { Err(OperationError::WrongService) });
            };
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok(OperationResponse::Status(TaskStatus::normalize(task_id, None)))
            })
        }
    }

    pub(crate) fn status_query(call_id: u64, timeout_ms: Option<u64>) -> Operation {
        Operation::QueryStatus {
            ctx: OperationContext::new(call_id, service_names::STATUS, timeout_ms),
            task_id: TaskId::new(format!("t-{call_id}")),
        }
    }

    pub(crate) fn answered_id(resp: &OperationResponse) -> &str {
        match resp {
            OperationResponse::Status(status) => status.task_id.as_str(),
            OperationResponse::Dispatched(_) => "",
        }
    }
}
