//! Task status endpoint.

use axum::extract::{Path, State};
use axum::Json;
use newsroute_core::{TaskId, TaskStatusBody};

use super::error::ApiError;
use super::AppState;

/// `GET /tasks/{task_id}`. Unknown ids answer `PENDING`.
///
/// # Errors
///
/// `500` when the broker query fails.
pub async fn task_status_handler(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusBody>, ApiError> {
    let status = state.app.task_status(TaskId::new(task_id)).await?;
    Ok(Json(TaskStatusBody::from(status)))
}
