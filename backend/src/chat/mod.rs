//! Chat module
//!
//! Data models for experts, sessions and messages, and the shared
//! message-sync service used by both the HTTP route and the reconciler.

pub mod models;
pub mod sync;

pub use models::{ChatMessage, Expert, ExpertDraft, FilePart, MessagePart, MessageRole, Session};
pub use sync::sync_messages;
