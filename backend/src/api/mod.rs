//! API module
//!
//! Contains HTTP request handlers for the chat, session, attachment and
//! expert endpoints, plus the router wiring them together.

pub mod attachments;
pub mod chat;
pub mod experts;
pub mod messages;
pub mod sessions;
pub mod streaming;
pub mod utils;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::state::AppState;
use utils::MAX_FILES_PER_UPLOAD;

/// Body of `GET /api/health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "healthy"
    pub status: String,
    /// Crate version
    pub version: String,
}

/// GET /api/health - Liveness probe
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Build the API router
///
/// The upload route accepts bodies large enough for a full batch of
/// maximum-size files; per-file limits are enforced by the handler.
pub fn router(state: AppState) -> Router {
    let upload_body_limit = state
        .max_upload_bytes
        .saturating_mul(MAX_FILES_PER_UPLOAD)
        .saturating_add(64 * 1024);

    Router::new()
        .route("/api/health", get(health_check))
        // Chat
        .route("/api/chat", post(chat::chat))
        .route("/api/messages/sync", post(messages::sync))
        // Sessions
        .route(
            "/api/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route("/api/sessions/delete", post(sessions::delete_session))
        .route("/api/sessions/:id/messages", get(sessions::list_messages))
        // Attachments
        .route(
            "/api/attachments/upload",
            post(attachments::upload).layer(DefaultBodyLimit::max(upload_body_limit)),
        )
        // Experts
        .route(
            "/api/experts",
            get(experts::list_experts).post(experts::save_expert),
        )
        .route("/api/experts/duplicate", post(experts::duplicate_expert))
        .route("/api/experts/reorder", post(experts::reorder_experts))
        .route("/api/experts/delete", post(experts::delete_expert))
        .route("/api/experts/generate", post(experts::generate_expert))
        .with_state(state)
}
