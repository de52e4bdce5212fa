//! API utility functions
//!
//! Request validation helpers shared by the handlers.

use crate::error::AppError;
use serde::Serialize;

/// Default and maximum page size for session listings
pub const MAX_SESSION_LIST: usize = 50;

/// Most files accepted in one upload request
pub const MAX_FILES_PER_UPLOAD: usize = 10;

/// `{"ok": true}`
#[derive(Debug, Serialize)]
pub struct OkResponse {
    /// Always true
    pub ok: bool,
}

impl OkResponse {
    /// The success body
    pub fn new() -> Self {
        Self { ok: true }
    }
}

impl Default for OkResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// Require a non-blank string field
///
/// # Arguments
/// * `value` - Field value, if present
/// * `message` - Error message when missing or blank
///
/// # Returns
/// * `Ok(String)` - The trimmed value
/// * `Err(AppError::BadRequest)` - If missing or blank
pub fn require_field(value: Option<&str>, message: &str) -> Result<String, AppError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::BadRequest(message.to_string()))
}

/// Clamp a requested page size to `1..=MAX_SESSION_LIST`
pub fn session_page_size(requested: Option<usize>) -> usize {
    requested.unwrap_or(MAX_SESSION_LIST).clamp(1, MAX_SESSION_LIST)
}
