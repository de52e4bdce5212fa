//! In-memory gateways shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use botchat_backend::chat::models::{
    ChatMessage, Expert, FilePart, NewExpert, Session, SessionUpdate,
};
use botchat_backend::gateway::{
    CompletionChunk, CompletionGateway, CompletionRequest, CompletionStream, DataGateway,
    GatewayError, UploadFile, UploadGateway,
};
use chrono::{Duration as ChronoDuration, Utc};
use futures_util::{stream, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct Store {
    experts: Vec<Expert>,
    sessions: Vec<Session>,
    messages: HashMap<String, Vec<ChatMessage>>,
    upserted_batches: Vec<Vec<String>>,
    fetch_delays: HashMap<String, Duration>,
    delete_delays: HashMap<String, Duration>,
    upsert_delay: Option<Duration>,
}

/// Data gateway keeping everything in memory
#[derive(Default)]
pub struct MemoryGateway {
    store: Mutex<Store>,
    /// Make every upsert fail
    pub fail_upserts: AtomicBool,
    /// Make every session delete fail
    pub fail_deletes: AtomicBool,
    /// Make every message fetch fail
    pub fail_fetches: AtomicBool,
    /// Number of upsert calls
    pub upsert_calls: AtomicUsize,
    /// Number of session inserts
    pub session_inserts: AtomicUsize,
}

pub fn expert(id: &str, slug: &str, sort_order: i64) -> Expert {
    Expert {
        id: id.to_string(),
        slug: slug.to_string(),
        name: format!("Expert {}", id),
        agent_name: format!("Agent {}", id),
        description: None,
        system_prompt: format!("You are {}.", slug),
        suggestion_question: None,
        sort_order,
        created_at: Utc::now(),
    }
}

pub fn session(id: &str, expert_id: &str, minutes_ago: i64) -> Session {
    let at = Utc::now() - ChronoDuration::minutes(minutes_ago);
    Session {
        id: id.to_string(),
        expert_id: expert_id.to_string(),
        title: "New chat".to_string(),
        last_message: None,
        created_at: at,
        updated_at: at,
    }
}

impl MemoryGateway {
    pub fn with(experts: Vec<Expert>, sessions: Vec<Session>) -> Self {
        let gateway = Self::default();
        {
            let mut store = gateway.store.lock().unwrap();
            store.experts = experts;
            store.sessions = sessions;
        }
        gateway
    }

    pub fn put_messages(&self, session_id: &str, messages: Vec<ChatMessage>) {
        self.store
            .lock()
            .unwrap()
            .messages
            .insert(session_id.to_string(), messages);
    }

    pub fn stored_messages(&self, session_id: &str) -> Vec<ChatMessage> {
        self.store
            .lock()
            .unwrap()
            .messages
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn stored_session(&self, session_id: &str) -> Option<Session> {
        self.store
            .lock()
            .unwrap()
            .sessions
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
    }

    /// Ids carried by each upsert call, in call order
    pub fn upserted_batches(&self) -> Vec<Vec<String>> {
        self.store.lock().unwrap().upserted_batches.clone()
    }

    /// Delay message fetches for one session
    pub fn delay_fetch(&self, session_id: &str, delay: Duration) {
        self.store
            .lock()
            .unwrap()
            .fetch_delays
            .insert(session_id.to_string(), delay);
    }

    /// Delay the delete of one session
    pub fn delay_delete(&self, session_id: &str, delay: Duration) {
        self.store
            .lock()
            .unwrap()
            .delete_delays
            .insert(session_id.to_string(), delay);
    }

    /// Hold every upsert for `delay` after it is counted and before it lands
    pub fn delay_upserts(&self, delay: Duration) {
        self.store.lock().unwrap().upsert_delay = Some(delay);
    }

    pub fn upserts(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataGateway for MemoryGateway {
    async fn list_experts(&self) -> Result<Vec<Expert>, GatewayError> {
        let mut experts = self.store.lock().unwrap().experts.clone();
        experts.sort_by_key(|e| e.sort_order);
        Ok(experts)
    }

    async fn seed_experts(&self, experts: &[NewExpert]) -> Result<(), GatewayError> {
        let mut store = self.store.lock().unwrap();
        for (i, row) in experts.iter().enumerate() {
            store.experts.retain(|e| e.slug != row.slug);
            store.experts.push(Expert {
                id: format!("seed-{}", i),
                slug: row.slug.clone(),
                name: row.name.clone(),
                agent_name: row.agent_name.clone(),
                description: row.description.clone(),
                system_prompt: row.system_prompt.clone(),
                suggestion_question: row.suggestion_question.clone(),
                sort_order: row.sort_order,
                created_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn insert_expert(&self, row: &NewExpert) -> Result<Expert, GatewayError> {
        let created = Expert {
            id: uuid::Uuid::new_v4().to_string(),
            slug: row.slug.clone(),
            name: row.name.clone(),
            agent_name: row.agent_name.clone(),
            description: row.description.clone(),
            system_prompt: row.system_prompt.clone(),
            suggestion_question: row.suggestion_question.clone(),
            sort_order: row.sort_order,
            created_at: Utc::now(),
        };
        self.store.lock().unwrap().experts.push(created.clone());
        Ok(created)
    }

    async fn update_expert(&self, id: &str, row: &NewExpert) -> Result<(), GatewayError> {
        let mut store = self.store.lock().unwrap();
        let expert = store
            .experts
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
        expert.slug = row.slug.clone();
        expert.name = row.name.clone();
        expert.system_prompt = row.system_prompt.clone();
        expert.sort_order = row.sort_order;
        Ok(())
    }

    async fn update_expert_sort_order(&self, id: &str, sort_order: i64) -> Result<(), GatewayError> {
        let mut store = self.store.lock().unwrap();
        if let Some(expert) = store.experts.iter_mut().find(|e| e.id == id) {
            expert.sort_order = sort_order;
        }
        Ok(())
    }

    async fn delete_expert(&self, id: &str) -> Result<(), GatewayError> {
        let mut store = self.store.lock().unwrap();
        if store.sessions.iter().any(|s| s.expert_id == id) {
            return Err(GatewayError::Conflict("Expert is in use".to_string()));
        }
        store.experts.retain(|e| e.id != id);
        Ok(())
    }

    async fn list_sessions(&self, limit: usize) -> Result<Vec<Session>, GatewayError> {
        let mut sessions = self.store.lock().unwrap().sessions.clone();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, GatewayError> {
        Ok(self.stored_session(id))
    }

    async fn insert_session(&self, expert_id: &str, title: &str) -> Result<Session, GatewayError> {
        self.session_inserts.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let created = Session {
            id: uuid::Uuid::new_v4().to_string(),
            expert_id: expert_id.to_string(),
            title: title.to_string(),
            last_message: None,
            created_at: now,
            updated_at: now,
        };
        self.store.lock().unwrap().sessions.push(created.clone());
        Ok(created)
    }

    async fn update_session(&self, id: &str, update: &SessionUpdate) -> Result<(), GatewayError> {
        let mut store = self.store.lock().unwrap();
        let session = store
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
        update.apply_to(session, Utc::now());
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<(), GatewayError> {
        let delay = self.store.lock().unwrap().delete_delays.get(id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("store offline".to_string()));
        }
        let mut store = self.store.lock().unwrap();
        store.sessions.retain(|s| s.id != id);
        store.messages.remove(id);
        Ok(())
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>, GatewayError> {
        let delay = self.store.lock().unwrap().fetch_delays.get(session_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("store offline".to_string()));
        }
        Ok(self.stored_messages(session_id))
    }

    async fn upsert_messages(
        &self,
        session_id: &str,
        messages: &[ChatMessage],
    ) -> Result<(), GatewayError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.store.lock().unwrap().upsert_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("store offline".to_string()));
        }
        let mut store = self.store.lock().unwrap();
        store
            .upserted_batches
            .push(messages.iter().map(|m| m.id.clone()).collect());
        let stored = store.messages.entry(session_id.to_string()).or_default();
        for message in messages {
            match stored.iter_mut().find(|m| m.id == message.id) {
                Some(existing) => *existing = message.clone(),
                None => stored.push(message.clone()),
            }
        }
        Ok(())
    }
}

/// Completion gateway replaying a fixed answer
pub struct ScriptedCompletion {
    answer: Vec<String>,
    chunk_delay: Option<Duration>,
    /// Requests received, in order
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new(answer: &[&str]) -> Self {
        Self {
            answer: answer.iter().map(|s| s.to_string()).collect(),
            chunk_delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before every chunk so a turn stays in flight
    pub fn with_delay(answer: &[&str], delay: Duration) -> Self {
        Self {
            chunk_delay: Some(delay),
            ..Self::new(answer)
        }
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionGateway for ScriptedCompletion {
    async fn stream_chat(&self, request: CompletionRequest) -> Result<CompletionStream, GatewayError> {
        self.requests.lock().unwrap().push(request);
        let mut chunks: Vec<Result<CompletionChunk, GatewayError>> = self
            .answer
            .iter()
            .map(|delta| Ok(CompletionChunk::TextDelta(delta.clone())))
            .collect();
        chunks.push(Ok(CompletionChunk::Finished {
            reason: "stop".to_string(),
        }));
        match self.chunk_delay {
            Some(delay) => Ok(Box::pin(stream::iter(chunks).then(move |chunk| async move {
                tokio::time::sleep(delay).await;
                chunk
            }))),
            None => Ok(Box::pin(stream::iter(chunks))),
        }
    }

    async fn generate_object(&self, _prompt: &str) -> Result<serde_json::Value, GatewayError> {
        Ok(serde_json::json!({
            "system_prompt": "You are generated.",
            "suggestion_question": "What can you do?"
        }))
    }
}

/// Upload gateway returning predictable public URLs
#[derive(Default)]
pub struct RecordingUploads {
    /// Make every upload fail
    pub fail: AtomicBool,
    /// Filenames received per call
    pub calls: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl UploadGateway for RecordingUploads {
    async fn upload(
        &self,
        session_id: &str,
        files: Vec<UploadFile>,
    ) -> Result<Vec<FilePart>, GatewayError> {
        self.calls
            .lock()
            .unwrap()
            .push(files.iter().map(|f| f.filename.clone()).collect());
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("storage offline".to_string()));
        }
        Ok(files
            .into_iter()
            .map(|f| FilePart {
                media_type: f.media_type,
                url: format!("https://files.test/{}/{}", session_id, f.filename),
                filename: Some(f.filename),
            })
            .collect())
    }
}

pub fn upload_file(name: &str, media_type: &str, size: usize) -> UploadFile {
    UploadFile {
        filename: name.to_string(),
        media_type: media_type.to_string(),
        data: vec![b'x'; size],
    }
}
