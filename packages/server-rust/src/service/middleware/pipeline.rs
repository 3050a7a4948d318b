//! Pipeline composition: combines all middleware layers into a single service stack.

use std::sync::Arc;

use tower::util::BoxService;
use tower::{Service, ServiceBuilder, ServiceExt};

use super::load_shed::LoadShedLayer;
use super::metrics::MetricsLayer;
use super::timeout::TimeoutLayer;
use crate::service::config::ServerConfig;
use crate::service::operation::{Operation, OperationError, OperationResponse};
use crate::service::router::OperationRouter;

/// Type-erased operation pipeline.
pub type OperationPipeline = BoxService<Operation, OperationResponse, OperationError>;

/// Build the operation pipeline by wrapping the `OperationRouter` with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `LoadShedLayer` -- reject when overloaded (fail fast before doing any work)
/// 2. `TimeoutLayer` -- enforce per-operation timeouts
/// 3. `MetricsLayer` -- record timing and outcome (closest to the actual handler)
#[must_use]
pub fn build_operation_pipeline(router: OperationRouter, config: &ServerConfig) -> OperationPipeline {
    let stack = ServiceBuilder::new()
        .layer(LoadShedLayer::new(config.max_concurrent_operations))
        .layer(TimeoutLayer)
        .layer(MetricsLayer)
        .service(router);
    BoxService::new(stack)
}

// ---------------------------------------------------------------------------
// SharedPipeline
// ---------------------------------------------------------------------------

/// Cloneable handle to one pipeline, shared by every request task.
///
/// The lock is held only while the pipeline is polled ready and the call is
/// issued; the returned future runs unlocked, so operations overlap.
#[derive(Clone)]
pub struct SharedPipeline {
    inner: Arc<tokio::sync::Mutex<OperationPipeline>>,
}

impl SharedPipeline {
    #[must_use]
    pub fn new(pipeline: OperationPipeline) -> Self {
        Self {
            inner: Arc::new(tokio::sync::Mutex::new(pipeline)),
        }
    }

    /// Run one operation through the pipeline.
    ///
    /// # Errors
    ///
    /// Whatever the pipeline or the target domain service returns.
    pub async fn execute(&self, op: Operation) -> Result<OperationResponse, OperationError> {
        let fut = {
            let mut pipeline = self.inner.lock().await;
            ServiceExt::ready(&mut *pipeline).await?;
            pipeline.call(op)
        };
        fut.await
    }
}

impl std::fmt::Debug for SharedPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedPipeline").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
