//! Gateway error types
//!
//! Failures reported by the remote collaborators (database, completion API,
//! object storage), independent of how they are surfaced to HTTP clients.

use thiserror::Error;

/// Errors that can occur while talking to a remote collaborator
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The HTTP request could not be sent or its body could not be read
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote service answered with a non-success status
    #[error("{service} returned error status {status}: {body}")]
    Status {
        /// Which collaborator failed
        service: &'static str,
        /// HTTP status code
        status: u16,
        /// Response body, as text
        body: String,
    },

    /// The local database failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A response could not be decoded into the expected shape
    #[error("Invalid response: {0}")]
    Decode(String),

    /// A row or object the caller referenced does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The write conflicts with existing data (e.g. a referenced expert)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The caller supplied invalid input
    #[error("Invalid input: {0}")]
    Invalid(String),

    /// A file exceeds the upload limit
    #[error("File {filename} is {size} bytes, which exceeds the {limit} byte limit")]
    PayloadTooLarge {
        /// Offending filename
        filename: String,
        /// Actual size in bytes
        size: usize,
        /// Configured limit in bytes
        limit: usize,
    },

    /// The collaborator is not configured or credentials are missing
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// Build a [`GatewayError::Status`] from a failed response, reading its body
    pub async fn from_response(service: &'static str, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error body".to_string());
        GatewayError::Status {
            service,
            status,
            body,
        }
    }

    /// True when the remote rate-limited the request
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GatewayError::Status { status: 429, .. })
    }
}
