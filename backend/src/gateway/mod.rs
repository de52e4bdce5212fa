//! Gateways to the remote collaborators
//!
//! Each collaborator sits behind a trait so the reconciler and the HTTP
//! handlers receive explicitly constructed instances instead of reaching for
//! a global client:
//!
//! - [`DataGateway`]: row-level access to experts, sessions and messages
//! - [`CompletionGateway`]: streaming text generation
//! - [`UploadGateway`]: attachment storage returning public URLs

pub mod error;
pub mod openai;
pub mod openai_types;
pub mod postgrest;
pub mod sqlite;
pub mod storage;

pub use error::GatewayError;
pub use openai::OpenAiGateway;
pub use postgrest::PostgrestGateway;
pub use sqlite::SqliteGateway;
pub use storage::{SupabaseStorage, UnconfiguredUploads};

use crate::chat::models::{
    ChatMessage, Expert, FilePart, NewExpert, Session, SessionUpdate,
};
use async_trait::async_trait;
use futures_util::stream::Stream;
use std::pin::Pin;

/// Row-level access to the three persisted tables
#[async_trait]
pub trait DataGateway: Send + Sync {
    /// All experts ordered by sort order, then creation time
    async fn list_experts(&self) -> Result<Vec<Expert>, GatewayError>;

    /// Insert the given experts, overwriting rows that share a slug
    async fn seed_experts(&self, experts: &[NewExpert]) -> Result<(), GatewayError>;

    /// Insert a new expert and return the stored row
    async fn insert_expert(&self, expert: &NewExpert) -> Result<Expert, GatewayError>;

    /// Overwrite the editable fields of an expert
    async fn update_expert(&self, id: &str, expert: &NewExpert) -> Result<(), GatewayError>;

    /// Change only the sort order of an expert
    async fn update_expert_sort_order(&self, id: &str, sort_order: i64)
        -> Result<(), GatewayError>;

    /// Delete an expert; fails with [`GatewayError::Conflict`] while sessions reference it
    async fn delete_expert(&self, id: &str) -> Result<(), GatewayError>;

    /// Most recently updated sessions first
    async fn list_sessions(&self, limit: usize) -> Result<Vec<Session>, GatewayError>;

    /// A single session, if it exists
    async fn get_session(&self, id: &str) -> Result<Option<Session>, GatewayError>;

    /// Create a session for an expert
    async fn insert_session(&self, expert_id: &str, title: &str) -> Result<Session, GatewayError>;

    /// Patch preview/title and advance `updated_at`
    async fn update_session(&self, id: &str, update: &SessionUpdate) -> Result<(), GatewayError>;

    /// Delete a session; its messages go with it
    async fn delete_session(&self, id: &str) -> Result<(), GatewayError>;

    /// Messages of a session in creation order
    async fn list_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>, GatewayError>;

    /// Insert or overwrite messages keyed on `(session_id, message id)`
    async fn upsert_messages(
        &self,
        session_id: &str,
        messages: &[ChatMessage],
    ) -> Result<(), GatewayError>;
}

/// Input of a chat completion
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt describing the persona
    pub system: String,
    /// Conversation so far, oldest first
    pub messages: Vec<ChatMessage>,
}

/// One increment of a streamed completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionChunk {
    /// More assistant text
    TextDelta(String),
    /// The model stopped generating
    Finished {
        /// Provider-reported stop reason
        reason: String,
    },
}

/// Stream of completion increments
pub type CompletionStream =
    Pin<Box<dyn Stream<Item = Result<CompletionChunk, GatewayError>> + Send>>;

/// Third-party text generation
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Start a streamed chat completion
    async fn stream_chat(&self, request: CompletionRequest)
        -> Result<CompletionStream, GatewayError>;

    /// Run a one-shot prompt whose answer must be a JSON object
    async fn generate_object(&self, prompt: &str) -> Result<serde_json::Value, GatewayError>;
}

/// A file waiting to be uploaded
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Original filename
    pub filename: String,
    /// MIME type reported by the client (may be empty)
    pub media_type: String,
    /// File contents
    pub data: Vec<u8>,
}

/// Attachment storage
#[async_trait]
pub trait UploadGateway: Send + Sync {
    /// Store the files for a session; the result preserves input order
    async fn upload(
        &self,
        session_id: &str,
        files: Vec<UploadFile>,
    ) -> Result<Vec<FilePart>, GatewayError>;
}

/// Reject a batch before any byte is sent if one file is too large
pub fn check_upload_sizes(files: &[UploadFile], limit: usize) -> Result<(), GatewayError> {
    if files.is_empty() {
        return Err(GatewayError::Invalid("No files provided.".to_string()));
    }
    match files.iter().find(|f| f.data.len() > limit) {
        Some(file) => Err(GatewayError::PayloadTooLarge {
            filename: file.filename.clone(),
            size: file.data.len(),
            limit,
        }),
        None => Ok(()),
    }
}
