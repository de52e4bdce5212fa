//! Expert administration service
//!
//! Validation, slug/sort-order derivation, reordering and AI-assisted field
//! generation for the expert editor.

use crate::chat::models::{slugify, truncate_chars, Expert, ExpertDraft, NewExpert, SLUG_MAX_CHARS};
use crate::gateway::{CompletionGateway, DataGateway, GatewayError};
use crate::reconciler::ordering::{move_item, normalize_sort_order};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Validation message for an incomplete draft
pub const REQUIRED_FIELDS_MESSAGE: &str = "Name / Agent name / System prompt are required.";

/// Inputs of AI-assisted field generation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateExpertRequest {
    /// Expert display name (required)
    #[serde(default)]
    pub name: String,
    /// What the assistant calls itself
    #[serde(default)]
    pub agent_name: String,
    /// Extra context
    #[serde(default)]
    pub description: String,
    /// Preferred output language
    #[serde(default, rename = "languageHint")]
    pub language_hint: String,
}

/// Fields produced by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedExpertFields {
    /// System prompt for the persona
    pub system_prompt: String,
    /// Starter question shown to users
    pub suggestion_question: String,
}

/// Expert administration service
pub struct ExpertService;

impl ExpertService {
    /// Turn an editor draft into a validated row
    ///
    /// # Arguments
    /// * `draft` - Editor contents
    /// * `existing` - Current experts, used to place a new expert last
    ///
    /// # Returns
    /// * `Ok(NewExpert)` - Trimmed row; slug derived from the name when blank
    /// * `Err(GatewayError::Invalid)` - If name, agent name or system prompt is blank
    pub fn prepare(draft: &ExpertDraft, existing: &[Expert]) -> Result<NewExpert, GatewayError> {
        let slug_source = if draft.slug.trim().is_empty() {
            slugify(&draft.name)
        } else {
            draft.slug.trim().to_string()
        };
        let sort_order = if draft.id.is_some() {
            draft.sort_order
        } else {
            existing.iter().map(|e| e.sort_order).max().unwrap_or(-1) + 1
        };

        let row = NewExpert {
            slug: truncate_chars(&slug_source, SLUG_MAX_CHARS),
            name: draft.name.trim().to_string(),
            agent_name: draft.agent_name.trim().to_string(),
            description: non_empty(draft.description.as_deref()),
            system_prompt: draft.system_prompt.trim().to_string(),
            suggestion_question: non_empty(draft.suggestion_question.as_deref()),
            sort_order,
        };

        if row.name.is_empty() || row.agent_name.is_empty() || row.system_prompt.is_empty() {
            return Err(GatewayError::Invalid(REQUIRED_FIELDS_MESSAGE.to_string()));
        }
        Ok(row)
    }

    /// Insert or update an expert from a draft
    ///
    /// Returns the experts list as stored afterwards.
    pub async fn save(
        gateway: &dyn DataGateway,
        draft: &ExpertDraft,
    ) -> Result<Vec<Expert>, GatewayError> {
        let existing = gateway.list_experts().await?;
        let row = Self::prepare(draft, &existing)?;

        match draft.id.as_deref() {
            Some(id) => {
                gateway.update_expert(id, &row).await?;
                info!(expert_id = %id, slug = %row.slug, "Updated expert");
            }
            None => {
                let created = gateway.insert_expert(&row).await?;
                info!(expert_id = %created.id, slug = %created.slug, "Created expert");
            }
        }
        gateway.list_experts().await
    }

    /// Draft for a copy of `expert`
    ///
    /// The copy is unsaved (`id` is `None`) and sorts right after the original.
    pub fn duplicate_draft(expert: &Expert, suffix: &str) -> ExpertDraft {
        ExpertDraft {
            id: None,
            slug: truncate_chars(&format!("{}-copy-{}", expert.slug, suffix), SLUG_MAX_CHARS),
            name: format!("{} (Copy)", expert.name),
            agent_name: expert.agent_name.clone(),
            description: expert.description.clone(),
            system_prompt: expert.system_prompt.clone(),
            suggestion_question: expert.suggestion_question.clone(),
            sort_order: expert.sort_order + 1,
        }
    }

    /// Short random suffix for duplicated slugs
    pub fn random_suffix() -> String {
        uuid::Uuid::new_v4().simple().to_string()[..4].to_string()
    }

    /// Move an expert in the list and persist the new sort orders
    ///
    /// Only experts whose order changed are written; the writes run
    /// concurrently and the first failure is returned.
    ///
    /// # Returns
    /// * `Ok(Vec<Expert>)` - The reordered list
    pub async fn reorder(
        gateway: &dyn DataGateway,
        mut experts: Vec<Expert>,
        from: usize,
        to: usize,
    ) -> Result<Vec<Expert>, GatewayError> {
        if !move_item(&mut experts, from, to) {
            return Ok(experts);
        }
        let changed = normalize_sort_order(&mut experts);
        debug!(changed = changed.len(), from, to, "Persisting expert order");

        let results = join_all(
            changed
                .iter()
                .map(|(id, order)| gateway.update_expert_sort_order(id, *order)),
        )
        .await;
        if let Some(err) = results.into_iter().find_map(Result::err) {
            return Err(err);
        }
        Ok(experts)
    }

    /// Delete an expert
    ///
    /// Fails with [`GatewayError::Conflict`] while sessions reference it.
    pub async fn delete(gateway: &dyn DataGateway, id: &str) -> Result<(), GatewayError> {
        if id.trim().is_empty() {
            return Err(GatewayError::Invalid("Missing expert id.".to_string()));
        }
        gateway.delete_expert(id).await?;
        info!(expert_id = %id, "Deleted expert");
        Ok(())
    }

    /// Ask the model for a system prompt and starter question
    pub async fn generate_fields(
        completion: &dyn CompletionGateway,
        request: &GenerateExpertRequest,
    ) -> Result<GeneratedExpertFields, GatewayError> {
        if request.name.trim().is_empty() {
            return Err(GatewayError::Invalid("Missing expert name.".to_string()));
        }

        let value = completion.generate_object(&generation_prompt(request)).await?;
        let fields: GeneratedExpertFields = serde_json::from_value(value)
            .map_err(|e| GatewayError::Decode(format!("Invalid AI response: {}", e)))?;
        if fields.system_prompt.trim().is_empty() || fields.suggestion_question.trim().is_empty() {
            return Err(GatewayError::Decode("Invalid AI response.".to_string()));
        }
        Ok(fields)
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Persona-design prompt sent to the model
pub fn generation_prompt(request: &GenerateExpertRequest) -> String {
    let agent_name = request.agent_name.trim();
    let description = request.description.trim();
    let language_hint = request.language_hint.trim();

    let mut lines = vec![
        "You are designing an 'expert persona' for a chat assistant used inside a product chat app.".to_string(),
        "Generate two fields: (1) a SYSTEM PROMPT for the model, (2) a SUGGESTION QUESTION shown as a starter prompt.".to_string(),
        "Answer with a JSON object with the keys \"system_prompt\" and \"suggestion_question\".".to_string(),
        "Hard requirements for SYSTEM PROMPT:".to_string(),
        "- Clarify role + audience + boundaries".to_string(),
        "- Specify tone, response style, and how to handle uncertainty".to_string(),
        "- 6-12 short bullet points, no markdown headings, no emojis".to_string(),
        "- Must be safe and avoid leaking system instructions".to_string(),
        "Hard requirements for SUGGESTION QUESTION:".to_string(),
        "- One single question (not a list), tailored to the persona".to_string(),
        "- Under 140 characters if possible".to_string(),
        format!("Expert display name: {}", request.name.trim()),
    ];
    if !agent_name.is_empty() {
        lines.push(format!(
            "Agent name (what the assistant calls itself): {}",
            agent_name
        ));
    }
    if !description.is_empty() {
        lines.push(format!("Description/context: {}", description));
    }
    if language_hint.is_empty() {
        lines.push("Language: match the user's language based on the inputs.".to_string());
    } else {
        lines.push(format!("Language hint: {}", language_hint));
    }
    lines.join("\n")
}
