//! Operation routing and execution framework.
//!
//! This module implements the service-oriented operation pipeline:
//!
//! 1. **Classification** (`classify`): request body -> `Result<Operation, ClassifyError>`
//! 2. **Middleware** (`middleware`): Tower layers (load-shedding, timeout, metrics)
//! 3. **Routing** (`router`): Dispatch to domain services by `service_name`
//! 4. **Domain services** (`domain`): dispatch and task status
//! 5. **Background workers** (`worker`): queued and periodic tasks

pub mod classify;
pub mod config;
pub mod domain;
pub mod middleware;
pub mod operation;
pub mod registry;
pub mod router;
pub mod worker;

// Re-export key types for convenient access.
pub use classify::OperationService;
pub use config::ServerConfig;
pub use middleware::{build_operation_pipeline, OperationPipeline, SharedPipeline};
pub use operation::{
    service_names, ClassifyError, Operation, OperationContext, OperationError,
    OperationResponse, Route,
};
pub use registry::{ManagedService, ServiceContext, ServiceRegistry};
pub use router::OperationRouter;
pub use worker::{BackgroundRunnable, BackgroundWorker};
