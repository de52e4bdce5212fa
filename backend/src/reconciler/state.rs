//! Reconciler state
//!
//! The local view of the session list and the active conversation, plus the
//! snapshot/event types handed to a presentation layer.

use crate::chat::models::{ChatMessage, Expert, Session};
use crate::reconciler::ordering::sort_sessions_by_recency;
use crate::reconciler::sync_status::{SyncOutcome, SyncStatus};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Progress of the current chat turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    /// Idle; a new message may be submitted
    #[default]
    Ready,
    /// Submitted, waiting for the first token
    Submitted,
    /// Assistant text is arriving
    Streaming,
}

/// Something observable changed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReconcilerEvent {
    /// Experts were (re)loaded
    ExpertsChanged,
    /// Session list contents or order changed
    SessionsChanged,
    /// Active session switched (or was cleared)
    ActiveSessionChanged {
        /// New active session
        session_id: Option<String>,
    },
    /// Messages of the active session were replaced or appended
    MessagesChanged,
    /// Assistant text arrived
    TextDelta {
        /// Assistant message being streamed
        message_id: String,
        /// New text
        delta: String,
    },
    /// Chat turn status changed
    StatusChanged {
        /// New status
        status: ChatStatus,
    },
    /// A sync window finished
    SyncSettled {
        /// Session the window belonged to
        session_id: String,
        /// How it ended
        outcome: SyncOutcome,
    },
}

/// Point-in-time copy of the reconciler state
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcilerSnapshot {
    /// Experts ordered by sort order
    pub experts: Vec<Expert>,
    /// Sessions, most recently updated first
    pub sessions: Vec<Session>,
    /// Active session
    pub active_session_id: Option<String>,
    /// Expert of the active session
    pub active_expert_id: Option<String>,
    /// Messages of the active session, oldest first
    pub messages: Vec<ChatMessage>,
    /// Message ids already handed to the remote store
    pub persisted_ids: BTreeSet<String>,
    /// Sessions with a delete request outstanding
    pub deleting: BTreeSet<String>,
    /// Sessions playing their removal animation
    pub removing: BTreeSet<String>,
    /// Unsent input
    pub draft: String,
    /// Chat turn status
    pub status: ChatStatus,
    /// Message sync status of the active session
    pub sync: SyncStatus,
}

/// Bookkeeping of the active session's sync window
#[derive(Default)]
pub(crate) struct SyncSlot {
    pub status: SyncStatus,
    pub next_generation: u64,
    /// Ids scheduled or dispatched in the current window
    pub batch: BTreeSet<String>,
    pub cancel: Option<CancellationToken>,
    pub task: Option<JoinHandle<()>>,
}

impl SyncSlot {
    /// Cancel the window; returns the ids it carried
    pub fn abort(&mut self) -> BTreeSet<String> {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.status = self.status.abort();
        std::mem::take(&mut self.batch)
    }
}

#[derive(Default)]
pub(crate) struct ReconcilerState {
    pub experts: Vec<Expert>,
    pub sessions: Vec<Session>,
    pub active_session_id: Option<String>,
    pub active_expert_id: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub persisted_ids: HashSet<String>,
    pub deleting: HashSet<String>,
    pub removing: HashSet<String>,
    pub draft: String,
    pub status: ChatStatus,
    /// Bumped on every session switch; async work quotes it to detect staleness
    pub selection: u64,
    pub sync: SyncSlot,
}

impl ReconcilerState {
    pub fn snapshot(&self) -> ReconcilerSnapshot {
        ReconcilerSnapshot {
            experts: self.experts.clone(),
            sessions: self.sessions.clone(),
            active_session_id: self.active_session_id.clone(),
            active_expert_id: self.active_expert_id.clone(),
            messages: self.messages.clone(),
            persisted_ids: self.persisted_ids.iter().cloned().collect(),
            deleting: self.deleting.iter().cloned().collect(),
            removing: self.removing.iter().cloned().collect(),
            draft: self.draft.clone(),
            status: self.status,
            sync: self.sync.status,
        }
    }

    pub fn session_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    pub fn resort_sessions(&mut self) {
        sort_sessions_by_recency(&mut self.sessions);
    }

    /// Switch to `session` (or to nothing), dropping the previous conversation
    pub fn activate(&mut self, session: Option<(&str, &str)>) {
        self.sync.abort();
        self.sync.status = SyncStatus::Idle;
        self.selection += 1;
        self.active_session_id = session.map(|(id, _)| id.to_string());
        self.active_expert_id = session.map(|(_, expert_id)| expert_id.to_string());
        self.messages.clear();
        self.persisted_ids.clear();
        self.draft.clear();
        self.status = ChatStatus::Ready;
    }

    /// Messages the next sync window should carry
    ///
    /// Everything not yet persisted, plus the latest assistant message when
    /// it was already persisted (its content may have been finalized since).
    pub fn pending_ids(&self) -> BTreeSet<String> {
        let mut ids: BTreeSet<String> = self
            .messages
            .iter()
            .filter(|m| !self.persisted_ids.contains(&m.id))
            .map(|m| m.id.clone())
            .collect();
        if let Some(last_assistant) = self
            .messages
            .iter()
            .rev()
            .find(|m| m.role == crate::chat::models::MessageRole::Assistant)
        {
            if self.persisted_ids.contains(&last_assistant.id) {
                ids.insert(last_assistant.id.clone());
            }
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::models::{MessagePart, MessageRole};

    #[test]
    fn test_pending_ids_include_persisted_last_assistant() {
        let user = ChatMessage::new(MessageRole::User, vec![MessagePart::text("hi")]);
        let first = ChatMessage::new(MessageRole::Assistant, vec![MessagePart::text("a")]);
        let second = ChatMessage::new(MessageRole::Assistant, vec![MessagePart::text("b")]);
        let fresh = ChatMessage::new(MessageRole::User, vec![MessagePart::text("new")]);

        let mut state = ReconcilerState::default();
        state.messages = vec![user.clone(), first.clone(), second.clone(), fresh.clone()];
        state.persisted_ids = [&user.id, &first.id, &second.id]
            .into_iter()
            .cloned()
            .collect();

        let ids = state.pending_ids();
        assert!(ids.contains(&fresh.id));
        assert!(ids.contains(&second.id));
        assert!(!ids.contains(&first.id));
        assert!(!ids.contains(&user.id));
    }

    #[test]
    fn test_activate_clears_conversation() {
        let mut state = ReconcilerState::default();
        state.messages = vec![ChatMessage::new(MessageRole::User, vec![])];
        state.persisted_ids.insert("x".to_string());
        state.draft = "typing".to_string();
        state.status = ChatStatus::Streaming;

        state.activate(Some(("s2", "e1")));
        assert_eq!(state.active_session_id.as_deref(), Some("s2"));
        assert_eq!(state.active_expert_id.as_deref(), Some("e1"));
        assert!(state.messages.is_empty());
        assert!(state.persisted_ids.is_empty());
        assert!(state.draft.is_empty());
        assert_eq!(state.status, ChatStatus::Ready);
        assert_eq!(state.selection, 1);

        state.activate(None);
        assert!(state.active_session_id.is_none());
        assert_eq!(state.selection, 2);
    }
}
