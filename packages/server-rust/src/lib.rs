//! newsroute server: axum HTTP surface, tower operation pipeline, handler
//! registry, and an in-process task broker.

pub mod app;
pub mod broker;
pub mod handler;
pub mod network;
pub mod observability;
pub mod service;

pub use app::{Application, ApplicationBuilder, BuildError, SubmitError};
pub use broker::{BrokerClient, BrokerError, MemoryBroker};
pub use handler::{
    handler_fn, AcknowledgeHandler, HandlerError, HandlerRegistry, NotificationHandler,
    RegistryError,
};
pub use network::{NetworkConfig, NetworkModule, TlsConfig};
pub use service::ServerConfig;
