//! PostgREST data gateway
//!
//! Talks to the hosted Supabase database through its REST interface.
//! Upserts use `on_conflict` with `Prefer: resolution=merge-duplicates`.

use crate::chat::models::{
    ChatMessage, Expert, MessagePart, MessageRole, NewExpert, Session, SessionUpdate,
    PLACEHOLDER_TITLE,
};
use crate::gateway::{DataGateway, GatewayError};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

const SERVICE: &str = "Supabase REST";
const EXPERT_SELECT: &str = "id,slug,name,agent_name,description,system_prompt,suggestion_question,sort_order,created_at";
const SESSION_SELECT: &str = "id,expert_id,title,last_message,created_at,updated_at";

/// Data gateway backed by a Supabase project
pub struct PostgrestGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct StoredMessage {
    ui_message_id: String,
    role: MessageRole,
    #[serde(default)]
    parts: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<StoredMessage> for ChatMessage {
    fn from(row: StoredMessage) -> Self {
        let parts: Vec<MessagePart> = match row.parts {
            serde_json::Value::Array(_) => serde_json::from_value(row.parts).unwrap_or_else(|e| {
                warn!(message_id = %row.ui_message_id, error = %e, "Dropping unreadable message parts");
                Vec::new()
            }),
            _ => Vec::new(),
        };
        Self {
            id: row.ui_message_id,
            role: row.role,
            parts,
            created_at: row.created_at,
        }
    }
}

#[derive(Serialize)]
struct MessageUpsertRow<'a> {
    session_id: &'a str,
    ui_message_id: &'a str,
    role: &'static str,
    content: String,
    parts: &'a [MessagePart],
    /// Client creation time; stable across re-upserts and keeps batch order
    created_at: DateTime<Utc>,
}

impl PostgrestGateway {
    /// Create a gateway for the project at `base_url` (e.g. `https://xyz.supabase.co`)
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/rest/v1/{}", self.base_url, table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, GatewayError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let error = GatewayError::from_response(SERVICE, response).await;
        Err(match (status, error) {
            (StatusCode::CONFLICT, GatewayError::Status { body, .. }) => GatewayError::Conflict(body),
            (StatusCode::NOT_FOUND, GatewayError::Status { body, .. }) => GatewayError::NotFound(body),
            (_, other) => other,
        })
    }

    async fn fetch<T: for<'de> Deserialize<'de>>(
        &self,
        request: RequestBuilder,
    ) -> Result<Vec<T>, GatewayError> {
        let response = self.send(request).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            GatewayError::Decode(format!("Failed to parse {} rows: {} - body: {}", SERVICE, e, body))
        })
    }
}

#[async_trait]
impl DataGateway for PostgrestGateway {
    async fn list_experts(&self) -> Result<Vec<Expert>, GatewayError> {
        self.fetch(self.request(Method::GET, "experts").query(&[
            ("select", EXPERT_SELECT),
            ("order", "sort_order.asc,created_at.asc"),
            ("limit", "200"),
        ]))
        .await
    }

    async fn seed_experts(&self, experts: &[NewExpert]) -> Result<(), GatewayError> {
        self.send(
            self.request(Method::POST, "experts")
                .query(&[("on_conflict", "slug")])
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(experts),
        )
        .await?;
        debug!(count = experts.len(), "Seeded experts");
        Ok(())
    }

    async fn insert_expert(&self, expert: &NewExpert) -> Result<Expert, GatewayError> {
        let rows: Vec<Expert> = self
            .fetch(
                self.request(Method::POST, "experts")
                    .query(&[("select", EXPERT_SELECT)])
                    .header("Prefer", "return=representation")
                    .json(expert),
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| GatewayError::Decode("Insert returned no expert row".to_string()))
    }

    async fn update_expert(&self, id: &str, expert: &NewExpert) -> Result<(), GatewayError> {
        let rows: Vec<serde_json::Value> = self
            .fetch(
                self.request(Method::PATCH, "experts")
                    .query(&[("id", format!("eq.{}", id)), ("select", "id".to_string())])
                    .header("Prefer", "return=representation")
                    .json(expert),
            )
            .await?;
        if rows.is_empty() {
            return Err(GatewayError::NotFound(format!("Expert {}", id)));
        }
        Ok(())
    }

    async fn update_expert_sort_order(
        &self,
        id: &str,
        sort_order: i64,
    ) -> Result<(), GatewayError> {
        self.send(
            self.request(Method::PATCH, "experts")
                .query(&[("id", format!("eq.{}", id))])
                .json(&json!({ "sort_order": sort_order })),
        )
        .await?;
        Ok(())
    }

    async fn delete_expert(&self, id: &str) -> Result<(), GatewayError> {
        self.send(
            self.request(Method::DELETE, "experts")
                .query(&[("id", format!("eq.{}", id))]),
        )
        .await?;
        debug!("Deleted expert: {}", id);
        Ok(())
    }

    async fn list_sessions(&self, limit: usize) -> Result<Vec<Session>, GatewayError> {
        self.fetch(self.request(Method::GET, "chat_sessions").query(&[
            ("select", SESSION_SELECT.to_string()),
            ("order", "updated_at.desc".to_string()),
            ("limit", limit.to_string()),
        ]))
        .await
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, GatewayError> {
        let rows: Vec<Session> = self
            .fetch(self.request(Method::GET, "chat_sessions").query(&[
                ("select", SESSION_SELECT.to_string()),
                ("id", format!("eq.{}", id)),
            ]))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_session(&self, expert_id: &str, title: &str) -> Result<Session, GatewayError> {
        let rows: Vec<Session> = self
            .fetch(
                self.request(Method::POST, "chat_sessions")
                    .query(&[("select", SESSION_SELECT)])
                    .header("Prefer", "return=representation")
                    .json(&json!({ "expert_id": expert_id, "title": title })),
            )
            .await?;
        let session = rows
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Decode("Insert returned no session row".to_string()))?;
        debug!("Created session: {}", session.id);
        Ok(session)
    }

    async fn update_session(&self, id: &str, update: &SessionUpdate) -> Result<(), GatewayError> {
        let found = match &update.last_message {
            Some(preview) => {
                let rows: Vec<serde_json::Value> = self
                    .fetch(
                        self.request(Method::PATCH, "chat_sessions")
                            .query(&[("id", format!("eq.{}", id)), ("select", "id".to_string())])
                            .header("Prefer", "return=representation")
                            .json(&json!({ "last_message": preview })),
                    )
                    .await?;
                !rows.is_empty()
            }
            None => self.get_session(id).await?.is_some(),
        };
        if !found {
            return Err(GatewayError::NotFound(format!("Session {}", id)));
        }

        // Only ever moves forward: rows already newer than `now` are left alone
        let now = Utc::now();
        self.send(
            self.request(Method::PATCH, "chat_sessions")
                .query(&[
                    ("id", format!("eq.{}", id)),
                    (
                        "updated_at",
                        format!("lt.{}", now.to_rfc3339_opts(SecondsFormat::Micros, true)),
                    ),
                ])
                .json(&json!({ "updated_at": now })),
        )
        .await?;

        if let Some(title) = &update.title {
            self.send(
                self.request(Method::PATCH, "chat_sessions")
                    .query(&[
                        ("id", format!("eq.{}", id)),
                        ("title", format!("eq.{}", PLACEHOLDER_TITLE)),
                    ])
                    .json(&json!({ "title": title })),
            )
            .await?;
        }
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<(), GatewayError> {
        self.send(
            self.request(Method::DELETE, "chat_sessions")
                .query(&[("id", format!("eq.{}", id))]),
        )
        .await?;
        debug!("Deleted session: {}", id);
        Ok(())
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>, GatewayError> {
        let rows: Vec<StoredMessage> = self
            .fetch(self.request(Method::GET, "chat_messages").query(&[
                ("select", "ui_message_id,role,parts,created_at".to_string()),
                ("session_id", format!("eq.{}", session_id)),
                ("order", "created_at.asc".to_string()),
            ]))
            .await?;
        Ok(rows.into_iter().map(ChatMessage::from).collect())
    }

    async fn upsert_messages(
        &self,
        session_id: &str,
        messages: &[ChatMessage],
    ) -> Result<(), GatewayError> {
        let rows: Vec<MessageUpsertRow> = messages
            .iter()
            .map(|m| MessageUpsertRow {
                session_id,
                ui_message_id: &m.id,
                role: m.role.as_str(),
                content: m.text(),
                parts: &m.parts,
                created_at: m.created_at,
            })
            .collect();

        self.send(
            self.request(Method::POST, "chat_messages")
                .query(&[("on_conflict", "session_id,ui_message_id")])
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(&rows),
        )
        .await?;

        debug!(
            session_id = %session_id,
            count = messages.len(),
            "Upserted messages"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn gateway(server: &Server) -> PostgrestGateway {
        PostgrestGateway::new(reqwest::Client::new(), &server.url(), "service-key")
    }

    #[tokio::test]
    async fn test_list_experts_parses_rows() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/experts")
            .match_query(Matcher::UrlEncoded(
                "order".into(),
                "sort_order.asc,created_at.asc".into(),
            ))
            .match_header("apikey", "service-key")
            .match_header("authorization", "Bearer service-key")
            .with_status(200)
            .with_body(
                r#"[{
                    "id": "e1", "slug": "travel-concierge", "name": "Travel Concierge",
                    "agent_name": "Kate", "description": null,
                    "system_prompt": "You are a travel concierge.",
                    "suggestion_question": null, "sort_order": 0,
                    "created_at": "2025-01-01T10:00:00.123456+00:00"
                }]"#,
            )
            .create_async()
            .await;

        let experts = gateway(&server).list_experts().await.unwrap();
        mock.assert_async().await;
        assert_eq!(experts.len(), 1);
        assert_eq!(experts[0].agent_name, "Kate");
    }

    #[tokio::test]
    async fn test_upsert_messages_uses_conflict_key() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/v1/chat_messages")
            .match_query(Matcher::UrlEncoded(
                "on_conflict".into(),
                "session_id,ui_message_id".into(),
            ))
            .match_header("prefer", Matcher::Regex("resolution=merge-duplicates".into()))
            .match_body(Matcher::PartialJsonString(
                r#"[{"session_id":"s1","role":"user","content":"hello","created_at":"2025-01-01T10:00:00.250Z"}]"#.into(),
            ))
            .with_status(201)
            .create_async()
            .await;

        let mut message = ChatMessage::new(MessageRole::User, vec![MessagePart::text("hello")]);
        message.created_at = DateTime::parse_from_rfc3339("2025-01-01T10:00:00.250Z")
            .unwrap()
            .with_timezone(&Utc);
        gateway(&server)
            .upsert_messages("s1", &[message])
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_referenced_expert_is_conflict() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("DELETE", "/rest/v1/experts")
            .match_query(Matcher::UrlEncoded("id".into(), "eq.e1".into()))
            .with_status(409)
            .with_body(r#"{"code":"23503","message":"violates foreign key constraint"}"#)
            .create_async()
            .await;

        let err = gateway(&server).delete_expert("e1").await.unwrap_err();
        mock.assert_async().await;
        assert!(matches!(err, GatewayError::Conflict(ref body) if body.contains("23503")));
    }

    #[tokio::test]
    async fn test_update_session_sets_title_only_on_placeholder() {
        let mut server = Server::new_async().await;
        let preview = server
            .mock("PATCH", "/rest/v1/chat_sessions")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), "eq.s1".into()),
                Matcher::UrlEncoded("select".into(), "id".into()),
            ]))
            .match_body(Matcher::PartialJsonString(r#"{"last_message":"hi"}"#.into()))
            .with_status(200)
            .with_body(r#"[{"id":"s1"}]"#)
            .create_async()
            .await;
        let touched = server
            .mock("PATCH", "/rest/v1/chat_sessions")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), "eq.s1".into()),
                Matcher::Regex("updated_at=lt\\.".into()),
            ]))
            .match_body(Matcher::Regex("updated_at".into()))
            .with_status(204)
            .create_async()
            .await;
        let title = server
            .mock("PATCH", "/rest/v1/chat_sessions")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), "eq.s1".into()),
                Matcher::UrlEncoded("title".into(), "eq.New chat".into()),
            ]))
            .match_body(Matcher::Json(json!({ "title": "hi there" })))
            .with_status(204)
            .create_async()
            .await;

        let update = SessionUpdate {
            last_message: Some("hi".to_string()),
            title: Some("hi there".to_string()),
        };
        gateway(&server).update_session("s1", &update).await.unwrap();
        preview.assert_async().await;
        touched.assert_async().await;
        title.assert_async().await;
    }

    #[tokio::test]
    async fn test_update_session_never_moves_updated_at_back() {
        let mut server = Server::new_async().await;
        let lookup = server
            .mock("GET", "/rest/v1/chat_sessions")
            .match_query(Matcher::UrlEncoded("id".into(), "eq.s1".into()))
            .with_status(200)
            .with_body(
                r#"[{"id":"s1","expert_id":"e1","title":"Trip","last_message":null,
                    "created_at":"2025-01-01T10:00:00+00:00","updated_at":"2999-01-01T10:00:00+00:00"}]"#,
            )
            .create_async()
            .await;
        let touched = server
            .mock("PATCH", "/rest/v1/chat_sessions")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), "eq.s1".into()),
                Matcher::Regex("updated_at=lt\\.\\d{4}-\\d{2}-\\d{2}T".into()),
            ]))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        gateway(&server)
            .update_session("s1", &SessionUpdate::default())
            .await
            .unwrap();
        lookup.assert_async().await;
        touched.assert_async().await;
    }

    #[tokio::test]
    async fn test_update_missing_session_is_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/rest/v1/chat_sessions")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let err = gateway(&server)
            .update_session("missing", &SessionUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_messages_tolerates_bad_parts() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/rest/v1/chat_messages")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("session_id".into(), "eq.s1".into()),
                Matcher::UrlEncoded("order".into(), "created_at.asc".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"[
                    {"ui_message_id":"m1","role":"user","parts":[{"type":"text","text":"hi"}],"created_at":"2025-01-01T10:00:00+00:00"},
                    {"ui_message_id":"m2","role":"assistant","parts":null,"created_at":"2025-01-01T10:00:01+00:00"}
                ]"#,
            )
            .create_async()
            .await;

        let messages = gateway(&server).list_messages("s1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text(), "hi");
        assert!(messages[1].parts.is_empty());
    }
}
