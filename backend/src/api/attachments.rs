//! Attachment upload endpoint
//!
//! Accepts multipart form data with:
//! - sessionId: session the files belong to (optional)
//! - files: one or more files

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use tracing::{error, info};

use crate::api::utils::MAX_FILES_PER_UPLOAD;
use crate::chat::models::FilePart;
use crate::error::AppError;
use crate::gateway::{check_upload_sizes, UploadFile};
use crate::state::AppState;

/// Folder used when the client sends no session id
const UNKNOWN_SESSION: &str = "unknown";

/// Response body of `POST /api/attachments/upload`
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Stored files, in upload order
    pub files: Vec<FilePart>,
}

fn bad_multipart(context: &str, e: impl std::fmt::Display) -> AppError {
    error!("Failed to read {}: {}", context, e);
    AppError::BadRequest(format!("Invalid multipart body: {}", e))
}

/// POST /api/attachments/upload - Store files and return their public URLs
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut session_id = UNKNOWN_SESSION.to_string();
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_multipart("multipart field", e))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "sessionId" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_multipart("sessionId field", e))?;
                if !text.trim().is_empty() {
                    session_id = text.trim().to_string();
                }
            }
            "files" => {
                if files.len() == MAX_FILES_PER_UPLOAD {
                    return Err(AppError::BadRequest(format!(
                        "At most {} files per upload.",
                        MAX_FILES_PER_UPLOAD
                    )));
                }
                let filename = field.file_name().unwrap_or("file").to_string();
                let media_type = field.content_type().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| bad_multipart("file data", e))?;
                files.push(UploadFile {
                    filename,
                    media_type,
                    data: data.to_vec(),
                });
            }
            _ => {}
        }
    }

    check_upload_sizes(&files, state.max_upload_bytes)?;

    let count = files.len();
    let stored = state.uploads.upload(&session_id, files).await?;
    info!(session_id = %session_id, count, "Uploaded attachments");

    Ok(Json(UploadResponse { files: stored }))
}
