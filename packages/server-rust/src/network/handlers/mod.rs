//! HTTP handler definitions for the newsroute server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for building the router.

pub mod error;
pub mod health;
pub mod notify;
pub mod tasks;

pub use error::ApiError;
pub use health::{health_handler, liveness_handler, readiness_handler};
pub use notify::process_email_handler;
pub use tasks::task_status_handler;

use std::sync::Arc;
use std::time::Instant;

use super::{NetworkConfig, ShutdownController};
use crate::app::Application;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Cloning is cheap: the application and controller are shared.
#[derive(Clone)]
pub struct AppState {
    /// Classification, dispatch, and status resolution.
    pub app: Application,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    pub config: Arc<NetworkConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
