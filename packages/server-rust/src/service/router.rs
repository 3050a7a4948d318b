//! Operation routing: sends each `Operation` to the domain service named in
//! its context (`"dispatch"` or `"status"`).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::util::BoxService;
use tower::{Service, ServiceExt};
use tracing::warn;

use super::operation::{Operation, OperationError, OperationResponse};

type RouteFuture = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

/// Name -> boxed domain service. Unregistered names fail with
/// `OperationError::UnknownService`.
pub struct OperationRouter {
    services: HashMap<&'static str, BoxService<Operation, OperationResponse, OperationError>>,
}

impl OperationRouter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
        }
    }

    /// Route `name` to `service`, replacing any previous registration.
    pub fn register<S>(&mut self, name: &'static str, service: S)
    where
        S: Service<Operation, Response = OperationResponse, Error = OperationError>
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        self.services.insert(name, service.boxed());
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }
}

impl Default for OperationRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Operation> for OperationRouter {
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = RouteFuture;

    /// Ready only when every domain service is ready.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        for svc in self.services.values_mut() {
            if let Err(e) = std::task::ready!(svc.poll_ready(cx)) {
                return Poll::Ready(Err(e));
            }
        }
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let name = op.ctx().service_name;
        if let Some(svc) = self.services.get_mut(name) {
            return svc.call(op);
        }
        warn!(service = name, call_id = op.ctx().call_id, "no service registered");
        Box::pin(async move {
            Err(OperationError::UnknownService {
                name: name.to_string(),
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
