//! SQLite data gateway
//!
//! Local implementation of [`DataGateway`] backed by sqlx. Used for
//! development without a hosted database and as the store in tests.

use crate::chat::models::{
    ChatMessage, Expert, MessagePart, MessageRole, NewExpert, Session, SessionUpdate,
};
use crate::gateway::{DataGateway, GatewayError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Database connection pool for the chat tables
pub struct SqliteGateway {
    pool: SqlitePool,
}

#[derive(FromRow)]
struct ExpertRow {
    id: String,
    slug: String,
    name: String,
    agent_name: String,
    description: Option<String>,
    system_prompt: String,
    suggestion_question: Option<String>,
    sort_order: i64,
    created_at: i64,
}

impl From<ExpertRow> for Expert {
    fn from(row: ExpertRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            name: row.name,
            agent_name: row.agent_name,
            description: row.description,
            system_prompt: row.system_prompt,
            suggestion_question: row.suggestion_question,
            sort_order: row.sort_order,
            created_at: from_millis(row.created_at),
        }
    }
}

#[derive(FromRow)]
struct SessionRow {
    id: String,
    expert_id: String,
    title: String,
    last_message: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            expert_id: row.expert_id,
            title: row.title,
            last_message: row.last_message,
            created_at: from_millis(row.created_at),
            updated_at: from_millis(row.updated_at),
        }
    }
}

#[derive(FromRow)]
struct MessageRow {
    ui_message_id: String,
    role: String,
    parts: String,
    created_at: i64,
}

impl From<MessageRow> for ChatMessage {
    fn from(row: MessageRow) -> Self {
        let parts: Vec<MessagePart> = serde_json::from_str(&row.parts).unwrap_or_else(|e| {
            warn!(message_id = %row.ui_message_id, error = %e, "Stored message parts are not valid JSON");
            Vec::new()
        });
        Self {
            id: row.ui_message_id,
            role: MessageRole::from(row.role.as_str()),
            parts,
            created_at: from_millis(row.created_at),
        }
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Map constraint violations onto the gateway's conflict/not-found variants
fn map_constraint(e: sqlx::Error, what: &str) -> GatewayError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_foreign_key_violation() {
            return GatewayError::Conflict(format!("{} violates a foreign key: {}", what, db));
        }
        if db.is_unique_violation() {
            return GatewayError::Conflict(format!("{} already exists: {}", what, db));
        }
    }
    GatewayError::Database(e)
}

const EXPERT_COLUMNS: &str = "id, slug, name, agent_name, description, system_prompt, suggestion_question, sort_order, created_at";
const SESSION_COLUMNS: &str = "id, expert_id, title, last_message, created_at, updated_at";

impl SqliteGateway {
    /// Open (or create) a database file and run migrations
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    pub async fn new(db_path: &str) -> Result<Self, GatewayError> {
        if let Some(parent) = PathBuf::from(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    GatewayError::Unavailable(format!("Failed to create db directory: {}", e))
                })?;
            }
        }

        // SQLite connection string format: sqlite:path/to/db.db
        let connection_string = if db_path.starts_with("sqlite:") {
            db_path.to_string()
        } else {
            format!("sqlite:{}", db_path)
        };

        let options = SqliteConnectOptions::from_str(&connection_string)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        info!("Connected to SQLite database at: {}", db_path);

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Private in-memory database (one connection, kept alive for the pool's lifetime)
    pub async fn in_memory() -> Result<Self, GatewayError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<(), GatewayError> {
        debug!("Running database migrations...");

        let migration_sql = include_str!("../../migrations/001_create_botchat.sql");

        // Drop comment lines, then split into statements
        let cleaned_sql: String = migration_sql
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with("--"))
            .collect::<Vec<_>>()
            .join(" ");

        for statement in cleaned_sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        debug!("Database migrations completed successfully");
        Ok(())
    }
}

#[async_trait]
impl DataGateway for SqliteGateway {
    async fn list_experts(&self) -> Result<Vec<Expert>, GatewayError> {
        let rows = sqlx::query_as::<_, ExpertRow>(&format!(
            "SELECT {} FROM experts ORDER BY sort_order ASC, created_at ASC LIMIT 200",
            EXPERT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Expert::from).collect())
    }

    async fn seed_experts(&self, experts: &[NewExpert]) -> Result<(), GatewayError> {
        let mut tx = self.pool.begin().await?;
        for expert in experts {
            sqlx::query(
                "INSERT INTO experts (id, slug, name, agent_name, description, system_prompt, suggestion_question, sort_order, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(slug) DO UPDATE SET
                    name = excluded.name,
                    agent_name = excluded.agent_name,
                    description = excluded.description,
                    system_prompt = excluded.system_prompt,
                    suggestion_question = excluded.suggestion_question,
                    sort_order = excluded.sort_order",
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(&expert.slug)
            .bind(&expert.name)
            .bind(&expert.agent_name)
            .bind(&expert.description)
            .bind(&expert.system_prompt)
            .bind(&expert.suggestion_question)
            .bind(expert.sort_order)
            .bind(now_millis())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!(count = experts.len(), "Seeded experts");
        Ok(())
    }

    async fn insert_expert(&self, expert: &NewExpert) -> Result<Expert, GatewayError> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO experts (id, slug, name, agent_name, description, system_prompt, suggestion_question, sort_order, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&expert.slug)
        .bind(&expert.name)
        .bind(&expert.agent_name)
        .bind(&expert.description)
        .bind(&expert.system_prompt)
        .bind(&expert.suggestion_question)
        .bind(expert.sort_order)
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| map_constraint(e, &format!("Expert '{}'", expert.slug)))?;

        let row = sqlx::query_as::<_, ExpertRow>(&format!(
            "SELECT {} FROM experts WHERE id = ?",
            EXPERT_COLUMNS
        ))
        .bind(&id)
        .fetch_one(&self.pool)
        .await?;

        debug!("Created expert: {}", id);
        Ok(row.into())
    }

    async fn update_expert(&self, id: &str, expert: &NewExpert) -> Result<(), GatewayError> {
        let result = sqlx::query(
            "UPDATE experts SET slug = ?, name = ?, agent_name = ?, description = ?, system_prompt = ?, suggestion_question = ?, sort_order = ?
             WHERE id = ?",
        )
        .bind(&expert.slug)
        .bind(&expert.name)
        .bind(&expert.agent_name)
        .bind(&expert.description)
        .bind(&expert.system_prompt)
        .bind(&expert.suggestion_question)
        .bind(expert.sort_order)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_constraint(e, &format!("Expert '{}'", expert.slug)))?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound(format!("Expert {}", id)));
        }
        Ok(())
    }

    async fn update_expert_sort_order(
        &self,
        id: &str,
        sort_order: i64,
    ) -> Result<(), GatewayError> {
        sqlx::query("UPDATE experts SET sort_order = ? WHERE id = ?")
            .bind(sort_order)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_expert(&self, id: &str) -> Result<(), GatewayError> {
        sqlx::query("DELETE FROM experts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| match map_constraint(e, "Expert") {
                GatewayError::Conflict(_) => GatewayError::Conflict(
                    "Expert is still referenced by chat sessions".to_string(),
                ),
                other => other,
            })?;

        debug!("Deleted expert: {}", id);
        Ok(())
    }

    async fn list_sessions(&self, limit: usize) -> Result<Vec<Session>, GatewayError> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM chat_sessions ORDER BY updated_at DESC LIMIT ?",
            SESSION_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Session::from).collect())
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, GatewayError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM chat_sessions WHERE id = ?",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Session::from))
    }

    async fn insert_session(&self, expert_id: &str, title: &str) -> Result<Session, GatewayError> {
        let now = now_millis();
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO chat_sessions (id, expert_id, title, last_message, created_at, updated_at)
             VALUES (?, ?, ?, NULL, ?, ?)",
        )
        .bind(&id)
        .bind(expert_id)
        .bind(title)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match map_constraint(e, "Session") {
            GatewayError::Conflict(_) => GatewayError::NotFound(format!("Expert {}", expert_id)),
            other => other,
        })?;

        debug!("Created session: {}", id);
        Ok(Session {
            id,
            expert_id: expert_id.to_string(),
            title: title.to_string(),
            last_message: None,
            created_at: from_millis(now),
            updated_at: from_millis(now),
        })
    }

    async fn update_session(&self, id: &str, update: &SessionUpdate) -> Result<(), GatewayError> {
        let result = sqlx::query(
            "UPDATE chat_sessions SET
                last_message = COALESCE(?1, last_message),
                title = CASE WHEN ?2 IS NOT NULL AND title = ?3 THEN ?2 ELSE title END,
                updated_at = MAX(updated_at, ?4)
             WHERE id = ?5",
        )
        .bind(&update.last_message)
        .bind(&update.title)
        .bind(crate::chat::models::PLACEHOLDER_TITLE)
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound(format!("Session {}", id)));
        }
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<(), GatewayError> {
        sqlx::query("DELETE FROM chat_sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        debug!("Deleted session: {}", id);
        Ok(())
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>, GatewayError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT ui_message_id, role, parts, created_at FROM chat_messages
             WHERE session_id = ? ORDER BY created_at ASC, seq ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ChatMessage::from).collect())
    }

    async fn upsert_messages(
        &self,
        session_id: &str,
        messages: &[ChatMessage],
    ) -> Result<(), GatewayError> {
        let mut tx = self.pool.begin().await?;
        for message in messages {
            let parts = serde_json::to_string(&message.parts)
                .map_err(|e| GatewayError::Decode(format!("Failed to encode parts: {}", e)))?;
            sqlx::query(
                "INSERT INTO chat_messages (session_id, ui_message_id, role, content, parts, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(session_id, ui_message_id) DO UPDATE SET
                    role = excluded.role,
                    content = excluded.content,
                    parts = excluded.parts",
            )
            .bind(session_id)
            .bind(&message.id)
            .bind(message.role.as_str())
            .bind(message.text())
            .bind(parts)
            .bind(message.created_at.timestamp_millis())
            .execute(&mut *tx)
            .await
            .map_err(|e| match map_constraint(e, "Message") {
                GatewayError::Conflict(_) => {
                    GatewayError::NotFound(format!("Session {}", session_id))
                }
                other => other,
            })?;
        }
        tx.commit().await?;

        debug!(
            session_id = %session_id,
            count = messages.len(),
            "Upserted messages"
        );
        Ok(())
    }
}
