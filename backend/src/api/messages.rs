//! Message persistence endpoints

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::api::utils::{require_field, OkResponse};
use crate::chat::models::ChatMessage;
use crate::chat::sync_messages;
use crate::error::AppError;
use crate::state::AppState;

/// Request body for `POST /api/messages/sync`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Target session
    #[serde(default)]
    pub session_id: Option<String>,
    /// Messages to upsert
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// POST /api/messages/sync - Upsert messages and refresh the session preview
pub async fn sync(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<OkResponse>, AppError> {
    let session_id = require_field(request.session_id.as_deref(), "Missing sessionId.")?;
    sync_messages(state.data.as_ref(), &session_id, &request.messages).await?;
    Ok(Json(OkResponse::new()))
}
