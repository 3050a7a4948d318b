//! Timing and outcome for every operation, recorded on a `tracing` span.
//!
//! Span fields: `service`, `call_id`, `handler_id` and `sender` (dispatch
//! only), then `duration_ms` and `outcome` once the operation resolves.
//! `outcome` is `"ok"` or the error's `kind()`.

use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::field::Empty;
use tracing::{info, info_span, Instrument, Span};

use super::OperationFuture;
use crate::service::operation::{Operation, OperationError, OperationResponse};

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

fn operation_span(op: &Operation) -> Span {
    let ctx = op.ctx();
    let span = info_span!(
        "operation",
        service = ctx.service_name,
        call_id = ctx.call_id,
        handler_id = Empty,
        sender = Empty,
        duration_ms = Empty,
        outcome = Empty,
    );
    if let Operation::Dispatch { route, sender, .. } = op {
        span.record("handler_id", route.handler_id.as_str());
        span.record("sender", sender.as_str());
    }
    span
}

impl<S> Service<Operation> for MetricsService<S>
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
        let span = operation_span(&op);
        let fut = self.inner.call(op);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                let outcome = result.as_ref().map_or_else(OperationError::kind, |_| "ok");

                let span = Span::current();
                span.record("duration_ms", duration_ms);
                span.record("outcome", outcome);
                info!(duration_ms, outcome, "operation complete");

                result
            }
            .instrument(span),
        )
    }
}
