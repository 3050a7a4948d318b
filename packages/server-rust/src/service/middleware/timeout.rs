//! Per-operation deadline.
//!
//! The deadline travels in `ctx.call_timeout_ms`: synchronous dispatch
//! carries the configured handler ceiling, status queries and queued
//! submissions carry none and pass straight through.
//!
//! Expiry is checked whenever the inner future yields, so a handler that
//! never reaches an `.await` is not cut short.

use std::task::{Context, Poll};
use std::time::Duration;

use tower::{Layer, Service};

use super::OperationFuture;
use crate::service::operation::{Operation, OperationError, OperationResponse};

#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutLayer;

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService { inner }
    }
}

/// Fails with `OperationError::HandlerTimeout` once the deadline passes.
/// The inner future is dropped at that point, so a timed-out handler stops
/// at its next await.
#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
}

impl<S> Service<Operation> for TimeoutService<S>
where
    S: Service<Operation, Response = OperationResponse, Error = OperationError>,
    S::Future: Send + 'static,
{
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = OperationFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let deadline = op.ctx().call_timeout_ms;
        let fut = self.inner.call(op);
        match deadline {
            None => Box::pin(fut),
            Some(timeout_ms) => Box::pin(async move {
                tokio::time::timeout(Duration::from_millis(timeout_ms), fut)
                    .await
                    .unwrap_or(Err(OperationError::HandlerTimeout { timeout_ms }))
            }),
        }
    }
}
