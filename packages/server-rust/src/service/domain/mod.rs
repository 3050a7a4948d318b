//! Domain services.
//!
//! Each service implements both `ManagedService` (lifecycle) and
//! `tower::Service<Operation>` on `Arc<Self>` (request handling), and is
//! registered with the `OperationRouter` under its service name.

pub mod dispatch;
pub mod status;

pub use dispatch::DispatchService;
pub use status::TaskStatusService;
