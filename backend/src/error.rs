//! Error types and error handling for the application
//!
//! This module defines the HTTP-facing error type. All errors implement
//! `IntoResponse` to provide consistent error formatting.

use crate::gateway::GatewayError;
use crate::reconciler::ReconcileError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error types
///
/// Each variant maps to one HTTP status via `IntoResponse`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Request is missing a field or carries an invalid value
    #[error("{0}")]
    BadRequest(String),

    /// Referenced row or object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write conflicts with existing data
    #[error("{0}")]
    Conflict(String),

    /// Upload exceeds the size limit
    #[error("{0}")]
    PayloadTooLarge(String),

    /// A remote collaborator failed
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// A collaborator is not configured
    #[error("{0}")]
    Unavailable(String),

    /// Internal server error (catch-all for unexpected errors)
    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Invalid(msg) => AppError::BadRequest(msg),
            GatewayError::NotFound(msg) => AppError::NotFound(msg),
            GatewayError::Conflict(msg) => AppError::Conflict(msg),
            e @ GatewayError::PayloadTooLarge { .. } => AppError::PayloadTooLarge(e.to_string()),
            GatewayError::Unavailable(msg) => AppError::Unavailable(msg),
            e @ (GatewayError::Transport(_) | GatewayError::Status { .. }) => {
                AppError::Upstream(e.to_string())
            }
            e => AppError::Internal(anyhow::Error::new(e)),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::NoActiveSession => AppError::BadRequest(err.to_string()),
            ReconcileError::UnknownSession(id) => AppError::NotFound(format!("Session {}", id)),
            ReconcileError::Upload(e) | ReconcileError::Completion(e) | ReconcileError::Data(e) => {
                e.into()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
