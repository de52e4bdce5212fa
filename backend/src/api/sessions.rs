//! Session endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::api::utils::{require_field, session_page_size, OkResponse};
use crate::chat::models::{ChatMessage, Session, PLACEHOLDER_TITLE};
use crate::error::AppError;
use crate::state::AppState;

/// Query parameters for `GET /api/sessions`
#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    /// Page size, at most 50
    pub limit: Option<usize>,
}

/// Request body for `POST /api/sessions`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Expert the new session talks to
    #[serde(default)]
    pub expert_id: Option<String>,
}

/// Request body for `POST /api/sessions/delete`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSessionRequest {
    /// Session to delete
    #[serde(default)]
    pub session_id: Option<String>,
}

/// GET /api/sessions - Most recently updated sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<Vec<Session>>, AppError> {
    let sessions = state
        .data
        .list_sessions(session_page_size(query.limit))
        .await?;
    Ok(Json(sessions))
}

/// POST /api/sessions - Create an empty session for an expert
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<Session>), AppError> {
    let expert_id = require_field(request.expert_id.as_deref(), "Missing expertId.")?;
    let session = state
        .data
        .insert_session(&expert_id, PLACEHOLDER_TITLE)
        .await?;
    info!(session_id = %session.id, expert_id = %expert_id, "Created session");
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/sessions/:id/messages - Messages of a session, oldest first
pub async fn list_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    let messages = state.data.list_messages(&session_id).await?;
    Ok(Json(messages))
}

/// POST /api/sessions/delete - Delete a session and its messages
pub async fn delete_session(
    State(state): State<AppState>,
    Json(request): Json<DeleteSessionRequest>,
) -> Result<Json<OkResponse>, AppError> {
    let session_id = require_field(request.session_id.as_deref(), "Missing sessionId.")?;
    state.data.delete_session(&session_id).await?;
    info!(session_id = %session_id, "Deleted session");
    Ok(Json(OkResponse::new()))
}
