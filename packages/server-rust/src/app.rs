//! Application assembly: wires the classification table, handlers, broker,
//! and domain services into one operation pipeline.
//!
//! Everything is passed in explicitly, so several independently configured
//! applications can live in one process.

use std::sync::Arc;

use newsroute_core::{ClassificationTable, DispatchOutcome, TaskId, TaskStatus};

use crate::broker::{BrokerClient, MemoryBroker};
use crate::handler::{HandlerRegistry, NotificationHandler, RegistryError};
use crate::service::domain::{DispatchService, TaskStatusService};
use crate::service::{
    build_operation_pipeline, service_names, ClassifyError, OperationError, OperationResponse,
    OperationRouter, OperationService, ServerConfig, ServiceContext, ServiceRegistry,
    SharedPipeline,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from assembling an application.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Errors from submitting one notification.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// Client-caused: malformed body, missing field, or unknown sender.
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error(transparent)]
    Operation(#[from] OperationError),
}

// ---------------------------------------------------------------------------
// ApplicationBuilder
// ---------------------------------------------------------------------------

/// Builder for [`Application`].
///
/// `build()` fails fast when a classification rule names a handler that was
/// never registered.
pub struct ApplicationBuilder {
    table: ClassificationTable,
    handlers: HandlerRegistry,
    broker: Option<Arc<dyn BrokerClient>>,
    config: ServerConfig,
}

impl ApplicationBuilder {
    #[must_use]
    pub fn new(table: ClassificationTable) -> Self {
        Self {
            table,
            handlers: HandlerRegistry::new(),
            broker: None,
            config: ServerConfig::default(),
        }
    }

    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Register the handler for `id`.
    ///
    /// # Errors
    ///
    /// `RegistryError::DuplicateHandler` if `id` is already registered.
    pub fn handler(
        mut self,
        id: &str,
        handler: Arc<dyn NotificationHandler>,
    ) -> Result<Self, RegistryError> {
        self.handlers.register(id, handler)?;
        Ok(self)
    }

    /// Use an external broker instead of the built-in [`MemoryBroker`].
    /// The caller owns that broker's lifecycle.
    #[must_use]
    pub fn broker(mut self, broker: Arc<dyn BrokerClient>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Assemble the application. Services are not started until
    /// [`Application::start`].
    ///
    /// # Errors
    ///
    /// `BuildError::Registry` if a rule references an unregistered handler.
    pub fn build(self) -> Result<Application, BuildError> {
        self.handlers.ensure_covers(&self.table)?;

        let config = Arc::new(self.config);
        let handlers = Arc::new(self.handlers);
        let services = Arc::new(ServiceRegistry::new());

        let broker: Arc<dyn BrokerClient> = match self.broker {
            Some(broker) => broker,
            None => {
                let memory = Arc::new(MemoryBroker::new(handlers.clone()));
                services.register(memory.clone());
                memory
            }
        };

        let dispatch = Arc::new(DispatchService::new(handlers, broker.clone()));
        let status = Arc::new(TaskStatusService::new(broker.clone()));
        services.register(dispatch.clone());
        services.register(status.clone());

        let mut router = OperationRouter::new();
        router.register(service_names::DISPATCH, dispatch);
        router.register(service_names::STATUS, status);

        let pipeline = SharedPipeline::new(build_operation_pipeline(router, &config));
        let operations = Arc::new(OperationService::new(
            Arc::new(self.table),
            config.clone(),
        ));

        Ok(Application {
            operations,
            pipeline,
            services,
            broker,
            config,
        })
    }
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// An assembled router: classification, dispatch, and status resolution.
///
/// Cheap to clone; clones share the same pipeline and broker.
#[derive(Clone)]
pub struct Application {
    operations: Arc<OperationService>,
    pipeline: SharedPipeline,
    services: Arc<ServiceRegistry>,
    broker: Arc<dyn BrokerClient>,
    config: Arc<ServerConfig>,
}

impl Application {
    /// Initialize managed services (spawns broker workers).
    ///
    /// # Errors
    ///
    /// Returns the first service `init()` failure.
    pub async fn start(&self) -> anyhow::Result<()> {
        let ctx = ServiceContext {
            config: self.config.clone(),
        };
        self.services.init_all(&ctx).await
    }

    /// Shut managed services down in reverse start order.
    ///
    /// # Errors
    ///
    /// Returns the first service `shutdown()` failure.
    pub async fn stop(&self, terminate: bool) -> anyhow::Result<()> {
        self.services.shutdown_all(terminate).await
    }

    /// Drop retained task records without stopping the services.
    ///
    /// # Errors
    ///
    /// Returns the first service `reset()` failure.
    pub async fn reset(&self) -> anyhow::Result<()> {
        self.services.reset_all().await
    }

    /// Validate, classify, and dispatch one raw submission body.
    ///
    /// # Errors
    ///
    /// `SubmitError::Classify` for client-caused failures (nothing was
    /// dispatched), `SubmitError::Operation` for dispatch failures.
    pub async fn submit(&self, body: &[u8]) -> Result<DispatchOutcome, SubmitError> {
        let op = self.operations.classify_submission(body)?;
        match self.pipeline.execute(op).await? {
            OperationResponse::Dispatched(outcome) => Ok(outcome),
            OperationResponse::Status(_) => Err(OperationError::WrongService.into()),
        }
    }

    /// Resolve the normalized status of `task_id`.
    ///
    /// # Errors
    ///
    /// `OperationError::StatusQueryFailed` when the broker cannot answer.
    pub async fn task_status(&self, task_id: TaskId) -> Result<TaskStatus, OperationError> {
        let op = self.operations.status_query(task_id);
        match self.pipeline.execute(op).await? {
            OperationResponse::Status(status) => Ok(status),
            OperationResponse::Dispatched(_) => Err(OperationError::WrongService),
        }
    }

    #[must_use]
    pub fn table(&self) -> &ClassificationTable {
        self.operations.table()
    }

    #[must_use]
    pub fn broker(&self) -> &Arc<dyn BrokerClient> {
        &self.broker
    }

    #[must_use]
    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("rules", &self.table().len())
            .field("services", &self.services.names())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
