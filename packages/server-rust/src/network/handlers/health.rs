//! Probe endpoints: `/health` (detail), `/health/live`, `/health/ready`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use super::AppState;

/// Always 200; the body says whether notifications are being accepted.
///
/// `queue_depth` counts queued tasks not yet picked up by a worker and is
/// `null` for brokers that cannot tell.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "state": state.shutdown.health_state().as_str(),
        "in_flight": state.shutdown.in_flight_count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "rules": state.app.table().len(),
        "queue_depth": state.app.broker().queue_depth(),
    }))
}

/// The process is up. Never consults dependencies.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// 200 only while submissions are accepted; 503 while starting, draining,
/// or stopped.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.accepts_requests() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
