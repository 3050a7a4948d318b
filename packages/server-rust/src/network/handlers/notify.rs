//! Notification submission endpoint.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use newsroute_core::{DispatchOutcome, SubmitAccepted};
use tracing::Instrument;

use super::error::ApiError;
use super::AppState;
use crate::network::middleware::REQUEST_ID_HEADER;
use crate::observability::submission_span;

/// `POST /process_email`.
///
/// The raw body is validated and classified before anything is dispatched.
/// Synchronous sources answer `200` with the handler's result; queued
/// sources answer `202` with the task id to poll.
///
/// # Errors
///
/// See [`ApiError::status`] for the status mapping.
pub async fn process_email_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    if !state.shutdown.accepts_requests() {
        return Err(ApiError::ShuttingDown);
    }
    let _guard = state.shutdown.in_flight_guard();

    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    let outcome = state
        .app
        .submit(&body)
        .instrument(submission_span(request_id))
        .await?;

    match outcome {
        DispatchOutcome::Completed(value) => Ok((StatusCode::OK, Json(value)).into_response()),
        DispatchOutcome::Accepted(task_id) => {
            Ok((StatusCode::ACCEPTED, Json(SubmitAccepted::from(task_id))).into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;
    use crate::network::handlers::test_support::test_state;

    fn body(sender: &str) -> Bytes {
        let doc = serde_json::json!({"metadata": {"sender": sender}});
        Bytes::from(serde_json::to_vec(&doc).unwrap())
    }

    #[tokio::test]
    async fn synchronous_source_answers_200_with_result() {
        let state = test_state();
        state.shutdown.set_ready();

        let response =
            process_email_handler(State(state), HeaderMap::new(), body("inline@news.test"))
                .await
                .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["source"], "inline");
        assert_eq!(value["sender"], "inline@news.test");
    }

    #[tokio::test]
    async fn draining_server_refuses_submissions() {
        let state = test_state();
        state.shutdown.set_ready();
        state.shutdown.trigger_shutdown();

        let err = process_email_handler(
            State(state.clone()),
            HeaderMap::new(),
            body("inline@news.test"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::ShuttingDown));
        assert_eq!(state.shutdown.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn in_flight_guard_is_released_after_response() {
        let state = test_state();
        state.shutdown.set_ready();

        let _ = process_email_handler(
            State(state.clone()),
            HeaderMap::new(),
            body("stranger@news.test"),
        )
        .await;
        assert_eq!(state.shutdown.in_flight_count(), 0);
    }
}
