//! Notification handlers and the registry that owns them.
//!
//! A handler is the external collaborator that turns one notification into a
//! result value. The router never looks inside the payload; it only decides
//! which handler receives it and whether that happens in-line or on the
//! broker queue.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use newsroute_core::{ClassificationTable, HandlerId, NotificationPayload};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error raised by a handler while processing a notification.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The handler understood the payload but could not process it.
    #[error("{0}")]
    Processing(String),
    /// The handler panicked; the message is the panic payload when it is text.
    #[error("handler panicked: {0}")]
    Panicked(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from assembling a handler registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("handler already registered: {0}")]
    DuplicateHandler(HandlerId),
    #[error("classification rule references unregistered handler: {0}")]
    MissingHandler(HandlerId),
}

// ---------------------------------------------------------------------------
// NotificationHandler
// ---------------------------------------------------------------------------

/// Processes one notification. Implementations must be safe to call
/// concurrently from request tasks and broker workers.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle(&self, payload: &NotificationPayload) -> Result<Value, HandlerError>;
}

/// Run `handler` on `payload`, reporting a panic as
/// [`HandlerError::Panicked`] instead of unwinding into the caller.
///
/// # Errors
///
/// Whatever the handler returns, or `Panicked`.
pub async fn call_guarded(
    handler: &dyn NotificationHandler,
    payload: &NotificationPayload,
) -> Result<Value, HandlerError> {
    AssertUnwindSafe(handler.handle(payload))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_text(panic.as_ref()))))
}

fn panic_text(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|text| (*text).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-text panic payload".to_string())
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, HandlerError>> + Send>>;

/// Adapts an async closure into a [`NotificationHandler`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(NotificationPayload) -> HandlerFuture + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> NotificationHandler for FnHandler<F>
where
    F: Fn(NotificationPayload) -> HandlerFuture + Send + Sync,
{
    async fn handle(&self, payload: &NotificationPayload) -> Result<Value, HandlerError> {
        (self.f)(payload.clone()).await
    }
}

/// Build an [`FnHandler`] from an async closure.
pub fn handler_fn<F, Fut>(f: F) -> impl NotificationHandler
where
    F: Fn(NotificationPayload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    FnHandler::new(move |payload| -> HandlerFuture { Box::pin(f(payload)) })
}

/// Accepts every notification and echoes back what it received.
///
/// Stands in for a source's content extractor: the result names the source,
/// the sender, and the top-level fields present in the payload.
#[derive(Debug, Clone)]
pub struct AcknowledgeHandler {
    source: String,
}

impl AcknowledgeHandler {
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

#[async_trait]
impl NotificationHandler for AcknowledgeHandler {
    async fn handle(&self, payload: &NotificationPayload) -> Result<Value, HandlerError> {
        let fields: Vec<&str> = payload
            .as_value()
            .as_object()
            .map(|map| map.keys().map(String::as_str).collect())
            .unwrap_or_default();
        Ok(json!({
            "source": self.source,
            "sender": payload.sender(),
            "fields": fields,
        }))
    }
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

/// Handler id -> handler. Mutable while the application is assembled,
/// shared read-only behind an `Arc` afterwards.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerId, Arc<dyn NotificationHandler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `id`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::DuplicateHandler` if `id` is already taken.
    pub fn register(
        &mut self,
        id: impl Into<HandlerId>,
        handler: Arc<dyn NotificationHandler>,
    ) -> Result<(), RegistryError> {
        let id = id.into();
        if self.handlers.contains_key(&id) {
            return Err(RegistryError::DuplicateHandler(id));
        }
        self.handlers.insert(id, handler);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: &HandlerId) -> Option<&Arc<dyn NotificationHandler>> {
        self.handlers.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &HandlerId) -> bool {
        self.handlers.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &HandlerId> {
        self.handlers.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Check that every rule in `table` names a registered handler.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::MissingHandler` for the first rule, in table
    /// order, whose handler is absent.
    pub fn ensure_covers(&self, table: &ClassificationTable) -> Result<(), RegistryError> {
        match table.handler_ids().find(|id| !self.contains(id)) {
            Some(missing) => Err(RegistryError::MissingHandler(missing.clone())),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&str> = self.handlers.keys().map(HandlerId::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("HandlerRegistry").field("handlers", &ids).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
