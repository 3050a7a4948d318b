//! Lifecycle registry for the router's long-lived services.
//!
//! The broker owns worker tasks that must be spawned before the first
//! submission and stopped after the last one; the dispatch and status
//! services are registered alongside it so the whole application starts and
//! stops in one call.

use std::any::{Any, TypeId};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, error};

use super::config::ServerConfig;

// ---------------------------------------------------------------------------
// ServiceContext
// ---------------------------------------------------------------------------

/// Handed to every service's `init()`.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    pub config: Arc<ServerConfig>,
}

// ---------------------------------------------------------------------------
// ManagedService trait
// ---------------------------------------------------------------------------

/// A service with an explicit start/stop lifecycle.
///
/// Started in registration order, stopped in reverse. The `Any` bound enables
/// typed lookup via `ServiceRegistry::get::<T>()`.
#[async_trait]
pub trait ManagedService: Send + Sync + Any {
    /// Unique name (e.g. `"broker"`).
    fn name(&self) -> &'static str;

    async fn init(&self, ctx: &ServiceContext) -> anyhow::Result<()>;

    /// Discard retained state (task records, caches) without stopping.
    async fn reset(&self) -> anyhow::Result<()>;

    /// Stop the service. With `terminate`, skip waiting for queued work.
    async fn shutdown(&self, terminate: bool) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// ServiceRegistry
// ---------------------------------------------------------------------------

/// Registry of managed services, addressable by name or by concrete type.
pub struct ServiceRegistry {
    by_name: DashMap<&'static str, Arc<dyn ManagedService>>,
    by_type: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    /// Registration order; drives init and (reversed) shutdown.
    order: RwLock<Vec<&'static str>>,
}

impl ServiceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            by_type: DashMap::new(),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Register a shared service. The caller may keep its own handle (the
    /// broker is also held as `Arc<dyn BrokerClient>`). Registering a name
    /// twice replaces the service but keeps its original position.
    pub fn register<T: ManagedService>(&self, service: Arc<T>) {
        let name = service.name();
        let replaced = self.by_name.insert(name, service.clone()).is_some();
        self.by_type.insert(TypeId::of::<T>(), service);
        if !replaced {
            self.order.write().push(name);
        }
    }

    /// Names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.order.read().clone()
    }

    pub fn get<T: ManagedService>(&self) -> Option<Arc<T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value().clone().downcast::<T>().ok())
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn ManagedService>> {
        self.by_name.get(name).map(|entry| entry.value().clone())
    }

    /// Start every service in registration order.
    ///
    /// When one fails, the services already started are shut down again
    /// (reverse order) before the error is returned.
    ///
    /// # Errors
    ///
    /// The failing service's `init()` error.
    pub async fn init_all(&self, ctx: &ServiceContext) -> anyhow::Result<()> {
        let order = self.names();
        for (started, name) in order.iter().enumerate() {
            let Some(service) = self.get_by_name(name) else {
                continue;
            };
            if let Err(e) = service.init(ctx).await {
                error!(service = name, error = %e, "service failed to start");
                for rollback in order[..started].iter().rev() {
                    if let Some(service) = self.get_by_name(rollback) {
                        if let Err(e) = service.shutdown(true).await {
                            error!(service = rollback, error = %e, "rollback shutdown failed");
                        }
                    }
                }
                return Err(e);
            }
            debug!(service = name, "service started");
        }
        Ok(())
    }

    /// Clear retained state on every service.
    ///
    /// # Errors
    ///
    /// The first `reset()` failure.
    pub async fn reset_all(&self) -> anyhow::Result<()> {
        for name in self.names() {
            if let Some(service) = self.get_by_name(name) {
                service.reset().await?;
            }
        }
        Ok(())
    }

    /// Stop every service in reverse registration order.
    ///
    /// A failing service does not keep the others running: all are asked to
    /// stop, and the first error is returned afterwards.
    ///
    /// # Errors
    ///
    /// The first `shutdown()` failure.
    pub async fn shutdown_all(&self, terminate: bool) -> anyhow::Result<()> {
        let mut first_error = None;
        for name in self.names().into_iter().rev() {
            let Some(service) = self.get_by_name(name) else {
                continue;
            };
            if let Err(e) = service.shutdown(terminate).await {
                error!(service = name, error = %e, "service failed to stop");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
