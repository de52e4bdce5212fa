//! Chat data models
//!
//! Defines experts, sessions and messages as they are persisted remotely,
//! plus the small text helpers used to derive titles and previews from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title given to a session until its first user message arrives
pub const PLACEHOLDER_TITLE: &str = "New chat";

/// Maximum length (in characters) of a session title
pub const TITLE_MAX_CHARS: usize = 60;

/// Maximum length (in characters) of a session's last-message preview
pub const PREVIEW_MAX_CHARS: usize = 500;

/// Maximum length (in characters) of an expert slug
pub const SLUG_MAX_CHARS: usize = 48;

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from the user
    User,
    /// Message from the assistant/AI
    Assistant,
    /// Instruction injected by the system
    System,
}

impl MessageRole {
    /// Convert the role to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

impl From<&str> for MessageRole {
    fn from(s: &str) -> Self {
        match s {
            "assistant" => MessageRole::Assistant,
            "system" => MessageRole::System,
            _ => MessageRole::User,
        }
    }
}

/// A file attachment reference carried inside a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePart {
    /// MIME type of the attachment
    #[serde(rename = "mediaType")]
    pub media_type: String,
    /// Display filename, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Publicly fetchable URL of the stored object
    pub url: String,
}

/// One segment of a message's rich content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    /// Plain text segment
    Text {
        /// The text itself
        text: String,
    },
    /// File attachment reference
    File(FilePart),
    /// Part kinds this backend does not interpret (reasoning, step markers, ...)
    #[serde(other)]
    Unknown,
}

impl MessagePart {
    /// Build a text part
    pub fn text(text: impl Into<String>) -> Self {
        MessagePart::Text { text: text.into() }
    }
}

/// A single message in a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Client-generated identifier, unique within its session
    pub id: String,
    /// Role of the message sender
    pub role: MessageRole,
    /// Rich content of the message
    #[serde(default)]
    pub parts: Vec<MessagePart>,
    /// When the message was created locally
    #[serde(default = "Utc::now", rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a new message with a fresh id
    pub fn new(role: MessageRole, parts: Vec<MessagePart>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            parts,
            created_at: Utc::now(),
        }
    }

    /// Plain-text projection of the message parts
    pub fn text(&self) -> String {
        message_text(&self.parts)
    }

    /// File parts of the message, in order
    pub fn files(&self) -> impl Iterator<Item = &FilePart> {
        self.parts.iter().filter_map(|part| match part {
            MessagePart::File(file) => Some(file),
            _ => None,
        })
    }
}

/// A named persona the assistant can adopt for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expert {
    /// Unique identifier
    pub id: String,
    /// URL-safe unique key
    pub slug: String,
    /// Display name of the expert
    pub name: String,
    /// Name the assistant uses for itself
    pub agent_name: String,
    /// Optional description shown in the picker
    #[serde(default)]
    pub description: Option<String>,
    /// Behavior contract sent as the system prompt
    pub system_prompt: String,
    /// Optional starter question
    #[serde(default)]
    pub suggestion_question: Option<String>,
    /// Position in the expert list
    pub sort_order: i64,
    /// When the expert was created
    pub created_at: DateTime<Utc>,
}

/// Editable fields of an expert (what the admin form submits)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpertDraft {
    /// Id of the expert being edited, `None` for a new one
    #[serde(default)]
    pub id: Option<String>,
    /// Slug; derived from the name when blank
    #[serde(default)]
    pub slug: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Name the assistant uses for itself
    #[serde(default)]
    pub agent_name: String,
    /// Optional picker description
    #[serde(default)]
    pub description: Option<String>,
    /// Behavior contract sent as the system prompt
    #[serde(default)]
    pub system_prompt: String,
    /// Optional starter question
    #[serde(default)]
    pub suggestion_question: Option<String>,
    /// Position in the expert list; new experts go last
    #[serde(default)]
    pub sort_order: i64,
}

impl From<&Expert> for ExpertDraft {
    fn from(expert: &Expert) -> Self {
        Self {
            id: Some(expert.id.clone()),
            slug: expert.slug.clone(),
            name: expert.name.clone(),
            agent_name: expert.agent_name.clone(),
            description: expert.description.clone(),
            system_prompt: expert.system_prompt.clone(),
            suggestion_question: expert.suggestion_question.clone(),
            sort_order: expert.sort_order,
        }
    }
}

/// Row written when inserting or updating an expert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExpert {
    /// Trimmed slug, at most `SLUG_MAX_CHARS` long
    pub slug: String,
    /// Display name
    pub name: String,
    /// Name the assistant uses for itself
    pub agent_name: String,
    /// Optional picker description
    pub description: Option<String>,
    /// Behavior contract, never blank
    pub system_prompt: String,
    /// Optional starter question
    pub suggestion_question: Option<String>,
    /// Position in the expert list
    pub sort_order: i64,
}

/// One persisted conversation thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    pub id: String,
    /// Expert this session talks to
    pub expert_id: String,
    /// Title derived from the first user message
    pub title: String,
    /// Preview of the most recent message
    #[serde(default)]
    pub last_message: Option<String>,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the session last changed
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Whether the title is still the placeholder
    pub fn has_placeholder_title(&self) -> bool {
        self.title == PLACEHOLDER_TITLE
    }
}

/// Patch applied to a session after its messages were synced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionUpdate {
    /// New preview text
    pub last_message: Option<String>,
    /// New title, applied only while the session still has the placeholder title
    pub title: Option<String>,
}

impl SessionUpdate {
    /// Derive the patch from a batch of messages
    pub fn from_messages(messages: &[ChatMessage]) -> Self {
        let last_message = messages
            .last()
            .map(|m| truncate_chars(m.text().trim(), PREVIEW_MAX_CHARS))
            .filter(|text| !text.is_empty());
        let title = messages
            .iter()
            .find(|m| m.role == MessageRole::User)
            .map(|m| truncate_chars(m.text().trim(), TITLE_MAX_CHARS))
            .filter(|text| !text.is_empty());
        Self {
            last_message,
            title,
        }
    }

    /// True when there is nothing to write
    pub fn is_empty(&self) -> bool {
        self.last_message.is_none() && self.title.is_none()
    }

    /// Apply the patch to a local session copy
    pub fn apply_to(&self, session: &mut Session, now: DateTime<Utc>) {
        if let Some(preview) = &self.last_message {
            session.last_message = Some(preview.clone());
        }
        if let Some(title) = &self.title {
            if session.has_placeholder_title() {
                session.title = title.clone();
            }
        }
        session.updated_at = session.updated_at.max(now);
    }
}

/// Plain-text projection of message parts
///
/// Non-empty text parts are joined with a blank line.
pub fn message_text(parts: &[MessagePart]) -> String {
    parts
        .iter()
        .filter_map(|part| match part {
            MessagePart::Text { text } if !text.is_empty() => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Keep at most `max` characters of `s`
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Derive a URL-safe slug from a display name
pub fn slugify(value: &str) -> String {
    let lowered = value.trim().to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    let mut pending_dash = false;
    for c in lowered.chars().filter(|c| *c != '\'' && *c != '"') {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    truncate_chars(&slug, SLUG_MAX_CHARS)
}

/// Preview line for a submission that carries attachments but no text
pub fn attachment_summary(filenames: &[String]) -> Option<String> {
    let first = filenames.first().map(String::as_str).unwrap_or("file");
    match filenames.len() {
        0 => None,
        1 => Some(format!("Attachment: {}", first)),
        n => Some(format!("Attachments: {} +{}", first, n - 1)),
    }
}
