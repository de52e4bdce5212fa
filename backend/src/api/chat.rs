//! Chat completion endpoint
//!
//! Streams the assistant's answer for a conversation as SSE events. The
//! persona comes from the session's expert, an explicit expert, or a preset.

use axum::{extract::State, response::Response, Json};
use serde::Deserialize;
use tracing::{debug, info};

use crate::api::streaming::{completion_events, create_sse_response};
use crate::chat::models::{ChatMessage, Expert};
use crate::error::AppError;
use crate::gateway::{CompletionRequest, DataGateway};
use crate::personas::resolve_system_prompt;
use crate::state::AppState;

/// Request body for `POST /api/chat`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Conversation so far, oldest first
    pub messages: Vec<ChatMessage>,
    /// Session the conversation belongs to
    #[serde(default)]
    pub session_id: Option<String>,
    /// Expert to answer as; overrides the session's expert
    #[serde(default)]
    pub expert_id: Option<String>,
    /// Preset persona used when no expert resolves
    #[serde(default)]
    pub preset_id: Option<String>,
}

/// Find the expert a request talks to
///
/// An explicit expert id wins; otherwise the session's expert is used.
/// Lookup failures fall back to no expert.
async fn resolve_expert(data: &dyn DataGateway, request: &ChatRequest) -> Option<Expert> {
    let expert_id = match request.expert_id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => id.to_string(),
        None => {
            let session_id = request.session_id.as_deref().filter(|id| !id.is_empty())?;
            data.get_session(session_id).await.ok().flatten()?.expert_id
        }
    };

    match data.list_experts().await {
        Ok(experts) => experts.into_iter().find(|e| e.id == expert_id),
        Err(e) => {
            debug!(error = %e, expert_id = %expert_id, "Expert lookup failed, using preset");
            None
        }
    }
}

/// POST /api/chat - Stream an assistant reply as SSE
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, AppError> {
    if request.messages.is_empty() {
        return Err(AppError::BadRequest("Invalid messages payload.".to_string()));
    }

    let expert = resolve_expert(state.data.as_ref(), &request).await;
    let preset = request
        .preset_id
        .as_deref()
        .or_else(|| expert.as_ref().map(|e| e.slug.as_str()));
    let system = resolve_system_prompt(expert.as_ref(), preset);

    info!(
        session_id = request.session_id.as_deref().unwrap_or(""),
        expert = expert.as_ref().map(|e| e.slug.as_str()).unwrap_or(""),
        messages = request.messages.len(),
        "Starting chat completion"
    );

    let completion = state
        .completion
        .stream_chat(CompletionRequest {
            system,
            messages: request.messages,
        })
        .await?;

    create_sse_response(completion_events(completion))
}
