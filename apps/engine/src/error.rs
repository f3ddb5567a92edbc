//! The engine-wide error taxonomy (§7): components return one of these
//! kinds upward, and only the HTTP boundary formats them for a caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use refnorm_dal::DalError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: session {session_id} already active")]
    Conflict { session_id: i64 },
    #[error("a normalization run is already in progress")]
    AlreadyRunning,
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("transient io: {0}")]
    TransientIo(String),
    #[error("fatal: {0}")]
    Fatal(String),
}

impl EngineError {
    /// The generic, detail-free message surfaced to an operator (§7): the
    /// original error is only ever recorded in structured logs.
    fn public_message(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "bad request",
            EngineError::NotFound(_) => "not found",
            EngineError::Conflict { .. } => "a session for this database is already active",
            EngineError::AlreadyRunning => "a normalization run is already in progress",
            EngineError::UpstreamUnavailable(_) => "upstream providers are unavailable",
            EngineError::TransientIo(_) => "a transient error occurred, retry later",
            EngineError::Fatal(_) => "internal error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Conflict { .. } => StatusCode::CONFLICT,
            EngineError::AlreadyRunning => StatusCode::CONFLICT,
            EngineError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::TransientIo(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DalError> for EngineError {
    fn from(err: DalError) -> Self {
        match err {
            DalError::NotFound(what) => EngineError::NotFound(what),
            DalError::SessionAlreadyActive { session_id, .. } => EngineError::Conflict { session_id },
            DalError::InvalidTransition { .. } => EngineError::Fatal(err.to_string()),
            DalError::Unavailable(msg) => EngineError::TransientIo(msg),
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");
        let status = self.status();
        let body = match &self {
            // Conflicts carry the owning session id so the caller can act on it (§7).
            EngineError::Conflict { session_id } => json!({
                "error": self.public_message(),
                "session_id": session_id,
            }),
            _ => json!({ "error": self.public_message() }),
        };
        (status, Json(body)).into_response()
    }
}
