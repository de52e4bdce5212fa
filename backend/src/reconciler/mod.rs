//! Session/message reconciler
//!
//! Keeps a local, responsive view of the session list and the active
//! conversation, and makes it eventually consistent with the remote store:
//!
//! - session switches, creation and deletion go to the [`DataGateway`] first
//! - submissions update the session list optimistically, upload attachments,
//!   then stream the assistant answer from the [`CompletionGateway`]
//! - message writes are debounced into one upsert per window and never block
//!   the caller; failures are logged and not retried
//!
//! All gateways are injected at construction. State lives behind one lock;
//! no lock is held across a network call.

pub mod error;
pub mod ordering;
pub mod state;
pub mod sync_status;

pub use error::ReconcileError;
pub use state::{ChatStatus, ReconcilerEvent, ReconcilerSnapshot};
pub use sync_status::{SyncOutcome, SyncStatus};

use crate::chat::models::{
    attachment_summary, truncate_chars, ChatMessage, MessagePart, MessageRole, Session,
    PLACEHOLDER_TITLE, PREVIEW_MAX_CHARS, TITLE_MAX_CHARS,
};
use crate::chat::sync_messages;
use crate::config::SyncConfig;
use crate::gateway::{
    CompletionChunk, CompletionGateway, CompletionRequest, DataGateway, UploadFile, UploadGateway,
};
use crate::personas::{resolve_system_prompt, seed_experts};
use chrono::Utc;
use futures_util::StreamExt;
use state::ReconcilerState;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Number of sessions loaded at startup
pub const SESSION_PAGE_SIZE: usize = 50;

const EVENT_CAPACITY: usize = 256;

/// Timing knobs of the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Quiet period before a message sync is dispatched
    pub debounce: Duration,
    /// Delay between a confirmed delete and removal from the list
    pub removal_delay: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(250),
            removal_delay: Duration::from_millis(180),
        }
    }
}

impl From<&SyncConfig> for ReconcilerConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            debounce: Duration::from_millis(config.debounce_ms),
            removal_delay: Duration::from_millis(config.session_removal_delay_ms),
        }
    }
}

struct Inner {
    state: RwLock<ReconcilerState>,
    data: Arc<dyn DataGateway>,
    completion: Arc<dyn CompletionGateway>,
    uploads: Arc<dyn UploadGateway>,
    config: ReconcilerConfig,
    events: broadcast::Sender<ReconcilerEvent>,
}

/// Client-side owner of the conversation view
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<Inner>,
}

impl Reconciler {
    /// Create a reconciler over explicitly constructed gateways
    pub fn new(
        data: Arc<dyn DataGateway>,
        completion: Arc<dyn CompletionGateway>,
        uploads: Arc<dyn UploadGateway>,
        config: ReconcilerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(ReconcilerState::default()),
                data,
                completion,
                uploads,
                config,
                events,
            }),
        }
    }

    /// Receive change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ReconcilerEvent> {
        self.inner.events.subscribe()
    }

    /// Copy of the current state
    pub async fn snapshot(&self) -> ReconcilerSnapshot {
        self.inner.state.read().await.snapshot()
    }

    fn emit(&self, event: ReconcilerEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    /// Load experts (seeding an empty table) and sessions, then open a conversation
    ///
    /// Selects the most recent session, or creates one for the first expert
    /// when there are none.
    pub async fn bootstrap(&self) -> Result<(), ReconcileError> {
        let data = &self.inner.data;
        let mut experts = data.list_experts().await?;
        if experts.is_empty() {
            info!("Experts table is empty, seeding defaults");
            data.seed_experts(&seed_experts()).await?;
            experts = data.list_experts().await?;
        }
        let sessions = data.list_sessions(SESSION_PAGE_SIZE).await?;
        info!(
            experts = experts.len(),
            sessions = sessions.len(),
            "Loaded experts and sessions"
        );

        let first_session = sessions.first().map(|s| s.id.clone());
        let first_expert = experts.first().map(|e| e.id.clone());
        {
            let mut state = self.inner.state.write().await;
            state.experts = experts;
            state.sessions = sessions;
            state.resort_sessions();
        }
        self.emit(ReconcilerEvent::ExpertsChanged);
        self.emit(ReconcilerEvent::SessionsChanged);

        match (first_session, first_expert) {
            (Some(session_id), _) => self.select_session(&session_id).await,
            (None, Some(expert_id)) => self.create_session(&expert_id).await.map(|_| ()),
            (None, None) => Ok(()),
        }
    }

    /// Reload experts from the remote store
    pub async fn refresh_experts(&self) -> Result<(), ReconcileError> {
        let experts = self.inner.data.list_experts().await?;
        self.inner.state.write().await.experts = experts;
        self.emit(ReconcilerEvent::ExpertsChanged);
        Ok(())
    }

    /// Make `session_id` the active conversation and load its messages
    ///
    /// Aborts the previous session's sync. A failed fetch leaves an empty
    /// conversation; a response that arrives after the user moved on is
    /// discarded.
    pub async fn select_session(&self, session_id: &str) -> Result<(), ReconcileError> {
        let selection = {
            let mut state = self.inner.state.write().await;
            let expert_id = state
                .sessions
                .iter()
                .find(|s| s.id == session_id)
                .map(|s| s.expert_id.clone())
                .ok_or_else(|| ReconcileError::UnknownSession(session_id.to_string()))?;
            state.activate(Some((session_id, expert_id.as_str())));
            state.selection
        };
        self.emit(ReconcilerEvent::ActiveSessionChanged {
            session_id: Some(session_id.to_string()),
        });

        let fetched = self.inner.data.list_messages(session_id).await;

        let mut state = self.inner.state.write().await;
        if state.selection != selection {
            debug!(session_id = %session_id, "Discarding stale message fetch");
            return Ok(());
        }
        match fetched {
            Ok(messages) => {
                state.persisted_ids = messages.iter().map(|m| m.id.clone()).collect();
                state.messages = messages;
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to load messages");
            }
        }
        drop(state);
        self.emit(ReconcilerEvent::MessagesChanged);
        Ok(())
    }

    /// Create a session for `expert_id` and make it active
    ///
    /// Issues exactly one insert per call.
    pub async fn create_session(&self, expert_id: &str) -> Result<Session, ReconcileError> {
        let session = match self
            .inner
            .data
            .insert_session(expert_id, PLACEHOLDER_TITLE)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                warn!(expert_id = %expert_id, error = %e, "Failed to create session");
                return Err(e.into());
            }
        };

        {
            let mut state = self.inner.state.write().await;
            state.sessions.insert(0, session.clone());
            state.activate(Some((session.id.as_str(), session.expert_id.as_str())));
        }
        info!(session_id = %session.id, expert_id = %expert_id, "Created session");
        self.emit(ReconcilerEvent::SessionsChanged);
        self.emit(ReconcilerEvent::ActiveSessionChanged {
            session_id: Some(session.id.clone()),
        });
        self.emit(ReconcilerEvent::MessagesChanged);
        Ok(session)
    }

    /// Delete a session remotely, then drop it from the list
    ///
    /// A second call while the first is outstanding does nothing. On failure
    /// the session stays and its deleting flag is cleared. On success the
    /// session is removed after the removal delay; if it was active, the most
    /// recent remaining session is selected (or the conversation is cleared).
    pub async fn delete_session(&self, session_id: &str) -> Result<(), ReconcileError> {
        {
            let mut state = self.inner.state.write().await;
            if !state.deleting.insert(session_id.to_string()) {
                debug!(session_id = %session_id, "Delete already in progress");
                return Ok(());
            }
        }
        self.emit(ReconcilerEvent::SessionsChanged);

        if let Err(e) = self.inner.data.delete_session(session_id).await {
            warn!(session_id = %session_id, error = %e, "Failed to delete session");
            self.inner.state.write().await.deleting.remove(session_id);
            self.emit(ReconcilerEvent::SessionsChanged);
            return Err(e.into());
        }

        self.inner
            .state
            .write()
            .await
            .removing
            .insert(session_id.to_string());
        self.emit(ReconcilerEvent::SessionsChanged);

        tokio::time::sleep(self.inner.config.removal_delay).await;

        let next = {
            let mut state = self.inner.state.write().await;
            state.deleting.remove(session_id);
            state.removing.remove(session_id);
            state.sessions.retain(|s| s.id != session_id);
            if state.active_session_id.as_deref() == Some(session_id) {
                let next = state
                    .sessions
                    .iter()
                    .find(|s| !state.deleting.contains(&s.id))
                    .map(|s| s.id.clone());
                if next.is_none() {
                    state.activate(None);
                }
                Some(next)
            } else {
                None
            }
        };
        info!(session_id = %session_id, "Deleted session");
        self.emit(ReconcilerEvent::SessionsChanged);

        match next {
            Some(Some(next_id)) => self.select_session(&next_id).await,
            Some(None) => {
                self.emit(ReconcilerEvent::ActiveSessionChanged { session_id: None });
                self.emit(ReconcilerEvent::MessagesChanged);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Replace the unsent input
    pub async fn set_draft(&self, text: &str) {
        self.inner.state.write().await.draft = text.to_string();
    }

    /// Send a user message and stream the assistant's answer
    ///
    /// Does nothing for empty input or while another turn is in flight.
    /// Attachments are uploaded before anything is sent; an upload failure
    /// aborts the submission. The optimistic session-list update is kept
    /// even when a later step fails.
    pub async fn submit_message(
        &self,
        text: &str,
        files: Vec<UploadFile>,
    ) -> Result<(), ReconcileError> {
        let text = text.trim().to_string();
        if text.is_empty() && files.is_empty() {
            return Ok(());
        }

        let (session_id, selection) = {
            let mut state = self.inner.state.write().await;
            if state.status != ChatStatus::Ready {
                debug!("Submission ignored, a turn is already in flight");
                return Ok(());
            }
            let session_id = state
                .active_session_id
                .clone()
                .ok_or(ReconcileError::NoActiveSession)?;

            let filenames: Vec<String> = files.iter().map(|f| f.filename.clone()).collect();
            let preview = if text.is_empty() {
                attachment_summary(&filenames).unwrap_or_default()
            } else {
                truncate_chars(&text, PREVIEW_MAX_CHARS)
            };
            let now = Utc::now();
            if let Some(session) = state.session_mut(&session_id) {
                if session.has_placeholder_title() && !text.is_empty() {
                    session.title = truncate_chars(&text, TITLE_MAX_CHARS);
                }
                session.last_message = Some(preview);
                session.updated_at = session.updated_at.max(now);
            }
            state.resort_sessions();
            state.draft.clear();
            state.status = ChatStatus::Submitted;
            (session_id, state.selection)
        };
        self.emit(ReconcilerEvent::SessionsChanged);
        self.emit(ReconcilerEvent::StatusChanged {
            status: ChatStatus::Submitted,
        });

        let mut parts = Vec::new();
        if !text.is_empty() {
            parts.push(MessagePart::text(text));
        }
        if !files.is_empty() {
            match self.inner.uploads.upload(&session_id, files).await {
                Ok(uploaded) => parts.extend(uploaded.into_iter().map(MessagePart::File)),
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Attachment upload failed");
                    self.finish_turn(selection).await;
                    return Err(ReconcileError::Upload(e));
                }
            }
        }

        let request = {
            let mut state = self.inner.state.write().await;
            if state.selection != selection {
                debug!(session_id = %session_id, "Session changed before send, dropping submission");
                return Ok(());
            }
            state
                .messages
                .push(ChatMessage::new(MessageRole::User, parts));
            let expert = state
                .active_expert_id
                .as_deref()
                .and_then(|id| state.experts.iter().find(|e| e.id == id));
            let system = resolve_system_prompt(expert, expert.map(|e| e.slug.as_str()));
            let request = CompletionRequest {
                system,
                messages: state.messages.clone(),
            };
            self.schedule_sync_locked(&mut state, &session_id);
            request
        };
        self.emit(ReconcilerEvent::MessagesChanged);

        let mut stream = match self.inner.completion.stream_chat(request).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Completion request failed");
                self.finish_turn(selection).await;
                return Err(ReconcileError::Completion(e));
            }
        };

        let assistant_id = uuid::Uuid::new_v4().to_string();
        let mut failure = None;
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(CompletionChunk::TextDelta(delta)) => {
                    let mut state = self.inner.state.write().await;
                    if state.selection != selection {
                        debug!(session_id = %session_id, "Session changed while streaming, dropping answer");
                        return Ok(());
                    }
                    let started = state.status != ChatStatus::Streaming;
                    state.status = ChatStatus::Streaming;
                    let created = append_assistant_text(&mut state.messages, &assistant_id, &delta);
                    if created {
                        self.schedule_sync_locked(&mut state, &session_id);
                    }
                    drop(state);
                    if started {
                        self.emit(ReconcilerEvent::StatusChanged {
                            status: ChatStatus::Streaming,
                        });
                    }
                    if created {
                        self.emit(ReconcilerEvent::MessagesChanged);
                    }
                    self.emit(ReconcilerEvent::TextDelta {
                        message_id: assistant_id.clone(),
                        delta,
                    });
                }
                Ok(CompletionChunk::Finished { reason }) => {
                    debug!(session_id = %session_id, reason = %reason, "Completion finished");
                    break;
                }
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Completion stream failed");
                    failure = Some(e);
                    break;
                }
            }
        }

        {
            let mut state = self.inner.state.write().await;
            if state.selection != selection {
                return Ok(());
            }
            let answer = state
                .messages
                .iter()
                .find(|m| m.id == assistant_id)
                .map(|m| truncate_chars(m.text().trim(), PREVIEW_MAX_CHARS));
            if let Some(answer) = answer.filter(|a| !a.is_empty()) {
                let now = Utc::now();
                if let Some(session) = state.session_mut(&session_id) {
                    session.last_message = Some(answer);
                    session.updated_at = session.updated_at.max(now);
                }
                state.resort_sessions();
                self.schedule_sync_locked(&mut state, &session_id);
            }
        }
        self.emit(ReconcilerEvent::SessionsChanged);
        self.finish_turn(selection).await;

        match failure {
            Some(e) => Err(ReconcileError::Completion(e)),
            None => Ok(()),
        }
    }

    async fn finish_turn(&self, selection: u64) {
        {
            let mut state = self.inner.state.write().await;
            if state.selection != selection {
                return;
            }
            state.status = ChatStatus::Ready;
        }
        self.emit(ReconcilerEvent::StatusChanged {
            status: ChatStatus::Ready,
        });
    }

    /// Schedule a debounced sync of the active session's pending messages
    pub async fn schedule_sync(&self) {
        let mut state = self.inner.state.write().await;
        if let Some(session_id) = state.active_session_id.clone() {
            self.schedule_sync_locked(&mut state, &session_id);
        }
    }

    /// Arm a new sync window, superseding the current one
    ///
    /// Ids of a superseded window are carried into the new one, so an
    /// aborted in-flight write is sent again with the next batch.
    fn schedule_sync_locked(&self, state: &mut ReconcilerState, session_id: &str) {
        let mut batch = state.pending_ids();
        if batch.is_empty() && !state.sync.status.is_active() {
            return;
        }

        let carried = state.sync.abort();
        batch.extend(carried);

        state.sync.next_generation += 1;
        let generation = state.sync.next_generation;
        state.sync.status = match state.sync.status.arm(generation) {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Invalid sync transition");
                return;
            }
        };
        let token = CancellationToken::new();
        state.sync.batch = batch.clone();
        state.sync.cancel = Some(token.clone());

        debug!(
            session_id = %session_id,
            generation = generation,
            pending = batch.len(),
            "Message sync scheduled"
        );

        let this = self.clone();
        let session_id = session_id.to_string();
        state.sync.task = Some(tokio::spawn(async move {
            this.run_sync(session_id, generation, batch, token).await;
        }));
    }

    async fn run_sync(
        &self,
        session_id: String,
        generation: u64,
        ids: BTreeSet<String>,
        token: CancellationToken,
    ) {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(self.inner.config.debounce) => {}
        }

        let messages = {
            let mut state = self.inner.state.write().await;
            if token.is_cancelled() {
                return;
            }
            state.sync.status = match state.sync.status.dispatch(generation) {
                Ok(status) => status,
                Err(e) => {
                    warn!(error = %e, "Invalid sync transition");
                    return;
                }
            };
            let messages: Vec<ChatMessage> = state
                .messages
                .iter()
                .filter(|m| ids.contains(&m.id))
                .cloned()
                .collect();
            // Marked before the write lands so a concurrent schedule does not resend
            state.persisted_ids.extend(ids.iter().cloned());
            messages
        };

        let result = tokio::select! {
            _ = token.cancelled() => return,
            result = sync_messages(self.inner.data.as_ref(), &session_id, &messages) => result,
        };

        let outcome = {
            let mut state = self.inner.state.write().await;
            if token.is_cancelled() {
                return;
            }
            let outcome = match result {
                Ok(update) => {
                    if let Some(session) = state.session_mut(&session_id) {
                        update.apply_to(session, Utc::now());
                    }
                    state.resort_sessions();
                    debug!(session_id = %session_id, count = messages.len(), "Message sync settled");
                    SyncOutcome::Persisted
                }
                Err(e) => {
                    warn!(
                        session_id = %session_id,
                        count = messages.len(),
                        error = %e,
                        "Message sync failed, not retrying"
                    );
                    SyncOutcome::Failed
                }
            };
            match state.sync.status.settle(generation, outcome) {
                Ok(status) => state.sync.status = status,
                Err(e) => warn!(error = %e, "Invalid sync transition"),
            }
            state.sync.batch.clear();
            state.sync.cancel = None;
            outcome
        };

        if outcome == SyncOutcome::Persisted {
            self.emit(ReconcilerEvent::SessionsChanged);
        }
        self.emit(ReconcilerEvent::SyncSettled {
            session_id,
            outcome,
        });
    }

    /// Wait until no sync window is pending or in flight
    pub async fn wait_for_sync(&self) {
        loop {
            let task = self.inner.state.write().await.sync.task.take();
            match task {
                Some(task) => {
                    if let Err(e) = task.await {
                        warn!(error = %e, "Sync task panicked");
                    }
                }
                None => break,
            }
        }
    }

    /// Abort any pending or in-flight sync
    pub async fn shutdown(&self) {
        let mut state = self.inner.state.write().await;
        let dropped = state.sync.abort();
        if !dropped.is_empty() {
            warn!(count = dropped.len(), "Shutting down with unsynced messages");
        }
        if let Some(task) = state.sync.task.take() {
            task.abort();
        }
    }
}

/// Append `delta` to the assistant message `id`, creating it if needed
///
/// Returns `true` when the message was created.
fn append_assistant_text(messages: &mut Vec<ChatMessage>, id: &str, delta: &str) -> bool {
    if let Some(message) = messages.iter_mut().rev().find(|m| m.id == id) {
        match message.parts.last_mut() {
            Some(MessagePart::Text { text }) => text.push_str(delta),
            _ => message.parts.push(MessagePart::text(delta)),
        }
        return false;
    }
    let mut message = ChatMessage::new(MessageRole::Assistant, vec![MessagePart::text(delta)]);
    message.id = id.to_string();
    messages.push(message);
    true
}
