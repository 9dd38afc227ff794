use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use envelo_core::error::{self, ApiError};

use crate::session::SessionState;

/// Failures of the local API, rendered as structured `ApiError` bodies.
#[derive(Debug)]
pub enum AppError {
    /// Malformed request (400)
    Validation {
        message: String,
        field: Option<String>,
        docs_hint: Option<String>,
    },
    /// The session has ended; nothing is enforcing any more (503)
    AgentStopped { state: SessionState },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = Some(uuid::Uuid::now_v7().to_string());

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::AgentStopped { state } => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiError {
                    error: error::codes::AGENT_STOPPED.to_string(),
                    message: format!("agent is {state}; actions cannot be enforced"),
                    field: None,
                    request_id,
                    docs_hint: Some(
                        "The certified system has lost active enforcement. \
                         Restart the agent before resuming operation."
                            .to_string(),
                    ),
                },
            ),
        };

        (status, Json(api_error)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation {
            message: rejection.body_text(),
            field: None,
            docs_hint: None,
        }
    }
}
