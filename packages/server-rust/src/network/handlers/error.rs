//! HTTP error mapping for the notification endpoints.
//!
//! Every failure becomes a status code plus `{ "error": message, "kind": code }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use newsroute_core::ErrorBody;

use crate::app::SubmitError;
use crate::service::{ClassifyError, OperationError};

/// Error returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed body, missing field, or unknown sender.
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error(transparent)]
    Operation(#[from] OperationError),
    /// The server is draining and refuses new submissions.
    #[error("server is shutting down")]
    ShuttingDown,
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Classify(e) => Self::Classify(e),
            SubmitError::Operation(e) => Self::Operation(e),
        }
    }
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Classify(_) => StatusCode::BAD_REQUEST,
            Self::Operation(OperationError::QueueUnavailable(_) | OperationError::Overloaded)
            | Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            Self::Operation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Classify(e) => e.kind(),
            Self::Operation(e) => e.kind(),
            Self::ShuttingDown => "shutting_down",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
