//! Expert administration endpoints

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::api::utils::{require_field, OkResponse};
use crate::chat::models::{Expert, ExpertDraft};
use crate::error::AppError;
use crate::services::experts::{ExpertService, GenerateExpertRequest, GeneratedExpertFields};
use crate::state::AppState;

/// Request body for `POST /api/experts/reorder`
#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    /// Current position of the expert being moved
    pub from: usize,
    /// Position it should end up at
    pub to: usize,
}

/// Request body carrying an expert id
#[derive(Debug, Deserialize)]
pub struct ExpertIdRequest {
    /// Target expert
    #[serde(default)]
    pub id: Option<String>,
}

/// GET /api/experts - All experts in display order
pub async fn list_experts(State(state): State<AppState>) -> Result<Json<Vec<Expert>>, AppError> {
    Ok(Json(state.data.list_experts().await?))
}

/// POST /api/experts - Create or update an expert from an editor draft
pub async fn save_expert(
    State(state): State<AppState>,
    Json(draft): Json<ExpertDraft>,
) -> Result<Json<Vec<Expert>>, AppError> {
    let experts = ExpertService::save(state.data.as_ref(), &draft).await?;
    Ok(Json(experts))
}

/// POST /api/experts/duplicate - Unsaved draft copying an expert
pub async fn duplicate_expert(
    State(state): State<AppState>,
    Json(request): Json<ExpertIdRequest>,
) -> Result<Json<ExpertDraft>, AppError> {
    let id = require_field(request.id.as_deref(), "Missing expert id.")?;
    let experts = state.data.list_experts().await?;
    let expert = experts
        .iter()
        .find(|e| e.id == id)
        .ok_or_else(|| AppError::NotFound(format!("Expert {}", id)))?;
    Ok(Json(ExpertService::duplicate_draft(
        expert,
        &ExpertService::random_suffix(),
    )))
}

/// POST /api/experts/reorder - Move an expert and persist the new order
pub async fn reorder_experts(
    State(state): State<AppState>,
    Json(request): Json<ReorderRequest>,
) -> Result<Json<Vec<Expert>>, AppError> {
    let experts = state.data.list_experts().await?;
    if request.from >= experts.len() || request.to >= experts.len() {
        return Err(AppError::BadRequest("Position out of range.".to_string()));
    }
    let experts =
        ExpertService::reorder(state.data.as_ref(), experts, request.from, request.to).await?;
    Ok(Json(experts))
}

/// POST /api/experts/delete - Delete an expert no session references
pub async fn delete_expert(
    State(state): State<AppState>,
    Json(request): Json<ExpertIdRequest>,
) -> Result<Json<OkResponse>, AppError> {
    let id = require_field(request.id.as_deref(), "Missing expert id.")?;
    ExpertService::delete(state.data.as_ref(), &id).await?;
    Ok(Json(OkResponse::new()))
}

/// POST /api/experts/generate - Draft a system prompt and starter question
pub async fn generate_expert(
    State(state): State<AppState>,
    Json(request): Json<GenerateExpertRequest>,
) -> Result<Json<GeneratedExpertFields>, AppError> {
    let fields = ExpertService::generate_fields(state.completion.as_ref(), &request).await?;
    Ok(Json(fields))
}
