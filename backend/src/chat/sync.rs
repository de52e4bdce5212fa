//! Message sync service
//!
//! Persists a batch of messages and, once that succeeded, patches the
//! owning session with a fresh preview and (maybe) a title.

use crate::chat::models::{ChatMessage, SessionUpdate};
use crate::gateway::{DataGateway, GatewayError};
use tracing::debug;

/// Upsert `messages` into `session_id`, then update the session row
///
/// The session update is only issued after the upsert resolved
/// successfully. Returns the update that was applied so callers can mirror
/// it locally. An empty batch writes nothing.
pub async fn sync_messages(
    gateway: &dyn DataGateway,
    session_id: &str,
    messages: &[ChatMessage],
) -> Result<SessionUpdate, GatewayError> {
    if session_id.trim().is_empty() {
        return Err(GatewayError::Invalid("Missing sessionId.".to_string()));
    }
    if messages.is_empty() {
        return Ok(SessionUpdate::default());
    }

    gateway.upsert_messages(session_id, messages).await?;

    let update = SessionUpdate::from_messages(messages);
    if !update.is_empty() {
        gateway.update_session(session_id, &update).await?;
    }

    debug!(
        session_id = %session_id,
        count = messages.len(),
        "Synced messages"
    );
    Ok(update)
}
