//! Embedded single-file SQL engine: SQLite via `sqlx`, WAL mode, foreign keys
//! on, busy-timeout >= 5s. The default, zero-external-dependency
//! driver selected when `DATABASE_URL` points at a file (or is unset).

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_context_protocol::{
    AgentMemory, AuditEvent, CoreError, CoreResult, Message, MessageType, SecureToken, Session, Visibility,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::driver::{memory_scope_column, memory_scope_domain, NewMessage, Storage};
use crate::migrations::SQLITE_SCHEMA;

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub async fn connect(dsn: &str) -> CoreResult<Self> {
        let options = SqliteConnectOptions::from_str(dsn)
            .map_err(|e| CoreError::storage_unavailable(format!("invalid sqlite DSN: {e}")))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(|e| CoreError::storage_unavailable(format!("failed to open sqlite store: {e}")))?;

        Ok(Self { pool })
    }

    fn map_sqlx_err(err: sqlx::Error) -> CoreError {
        match &err {
            sqlx::Error::Database(db_err) if db_err.message().contains("busy") || db_err.message().contains("locked") => {
                CoreError::storage_busy(100)
            }
            sqlx::Error::PoolTimedOut => CoreError::storage_busy(100),
            _ => CoreError::internal(format!("storage error: {err}")),
        }
    }

    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> CoreResult<Session> {
        let metadata_raw: String = row.try_get("metadata").map_err(Self::map_sqlx_err)?;
        Ok(Session {
            id: row.try_get("id").map_err(Self::map_sqlx_err)?,
            purpose: row.try_get("purpose").map_err(Self::map_sqlx_err)?,
            created_by: row.try_get("created_by").map_err(Self::map_sqlx_err)?,
            created_at: parse_ts(row.try_get("created_at").map_err(Self::map_sqlx_err)?)?,
            updated_at: parse_ts(row.try_get("updated_at").map_err(Self::map_sqlx_err)?)?,
            is_active: row.try_get::<i64, _>("is_active").map_err(Self::map_sqlx_err)? != 0,
            metadata: serde_json::from_str(&metadata_raw).unwrap_or(serde_json::Value::Null),
        })
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> CoreResult<Message> {
        let metadata_raw: String = row.try_get("metadata").map_err(Self::map_sqlx_err)?;
        let visibility_raw: String = row.try_get("visibility").map_err(Self::map_sqlx_err)?;
        let type_raw: String = row.try_get("message_type").map_err(Self::map_sqlx_err)?;
        Ok(Message {
            id: row.try_get("id").map_err(Self::map_sqlx_err)?,
            session_id: row.try_get("session_id").map_err(Self::map_sqlx_err)?,
            sender: row.try_get("sender").map_err(Self::map_sqlx_err)?,
            content: row.try_get("content").map_err(Self::map_sqlx_err)?,
            visibility: Visibility::parse(&visibility_raw)
                .ok_or_else(|| CoreError::internal("corrupt visibility value in storage"))?,
            message_type: MessageType::parse(&type_raw)
                .ok_or_else(|| CoreError::internal("corrupt message_type value in storage"))?,
            metadata: serde_json::from_str(&metadata_raw).unwrap_or(serde_json::Value::Null),
            timestamp: parse_ts(row.try_get("timestamp").map_err(Self::map_sqlx_err)?)?,
            parent_message_id: row.try_get("parent_message_id").map_err(Self::map_sqlx_err)?,
        })
    }

    fn row_to_memory(row: &sqlx::sqlite::SqliteRow) -> CoreResult<AgentMemory> {
        let metadata_raw: String = row.try_get("metadata").map_err(Self::map_sqlx_err)?;
        let expires_raw: Option<String> = row.try_get("expires_at").map_err(Self::map_sqlx_err)?;
        Ok(AgentMemory {
            agent_id: row.try_get("agent_id").map_err(Self::map_sqlx_err)?,
            session_id: memory_scope_domain(row.try_get("session_id").map_err(Self::map_sqlx_err)?),
            key: row.try_get("key").map_err(Self::map_sqlx_err)?,
            value: row.try_get("value").map_err(Self::map_sqlx_err)?,
            metadata: serde_json::from_str(&metadata_raw).unwrap_or(serde_json::Value::Null),
            created_at: parse_ts(row.try_get("created_at").map_err(Self::map_sqlx_err)?)?,
            updated_at: parse_ts(row.try_get("updated_at").map_err(Self::map_sqlx_err)?)?,
            expires_at: expires_raw.map(|s| parse_ts(s)).transpose()?,
        })
    }

    fn row_to_token(row: &sqlx::sqlite::SqliteRow) -> CoreResult<SecureToken> {
        Ok(SecureToken {
            token_id: row.try_get("token_id").map_err(Self::map_sqlx_err)?,
            encrypted_jwt: row.try_get("encrypted_jwt").map_err(Self::map_sqlx_err)?,
            nonce: row.try_get("nonce").map_err(Self::map_sqlx_err)?,
            agent_id: row.try_get("agent_id").map_err(Self::map_sqlx_err)?,
            expires_at: parse_ts(row.try_get("expires_at").map_err(Self::map_sqlx_err)?)?,
            created_at: parse_ts(row.try_get("created_at").map_err(Self::map_sqlx_err)?)?,
        })
    }
}

fn parse_ts(raw: String) -> CoreResult<DateTime<Utc>> {
    crate::time::parse(&raw).map_err(|e| CoreError::internal(format!("corrupt timestamp in storage: {e}")))
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn migrate(&self) -> CoreResult<()> {
        sqlx::query(SQLITE_SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        Ok(())
    }

    async fn ping(&self) -> CoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(Self::map_sqlx_err)?;
        Ok(())
    }

    async fn insert_session(&self, session: &Session) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO sessions (id, purpose, created_by, created_at, updated_at, is_active, metadata) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.purpose)
        .bind(&session.created_by)
        .bind(crate::time::format(session.created_at))
        .bind(crate::time::format(session.updated_at))
        .bind(session.is_active as i64)
        .bind(session.metadata.to_string())
        .execute(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        Ok(())
    }

    async fn get_session(&self, id: &str) -> CoreResult<Option<Session>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn list_sessions_for_agent(&self, agent_id: &str, offset: i64, limit: i64) -> CoreResult<Vec<Session>> {
        let rows = sqlx::query(
            "SELECT DISTINCT s.* FROM sessions s \
             LEFT JOIN messages m ON m.session_id = s.id AND m.sender = ? \
             WHERE s.created_by = ? OR m.sender IS NOT NULL \
             ORDER BY s.updated_at DESC LIMIT ? OFFSET ?",
        )
        .bind(agent_id)
        .bind(agent_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        rows.iter().map(Self::row_to_session).collect()
    }

    async fn touch_session(&self, id: &str, at: DateTime<Utc>) -> CoreResult<()> {
        sqlx::query("UPDATE sessions SET updated_at = ? WHERE id = ?")
            .bind(crate::time::format(at))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(Self::map_sqlx_err)?;
        sqlx::query("DELETE FROM messages WHERE session_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Self::map_sqlx_err)?;
        sqlx::query("DELETE FROM agent_memory WHERE session_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Self::map_sqlx_err)?;
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Self::map_sqlx_err)?;
        tx.commit().await.map_err(Self::map_sqlx_err)?;
        Ok(())
    }

    async fn insert_message(&self, message: &NewMessage) -> CoreResult<i64> {
        let result = sqlx::query(
            "INSERT INTO messages (session_id, sender, content, visibility, message_type, metadata, timestamp, parent_message_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.session_id)
        .bind(&message.sender)
        .bind(&message.content)
        .bind(message.visibility.as_str())
        .bind(message.message_type.as_str())
        .bind(message.metadata.to_string())
        .bind(crate::time::format(message.timestamp))
        .bind(message.parent_message_id)
        .execute(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        Ok(result.last_insert_rowid())
    }

    async fn get_message_by_id(&self, id: i64) -> CoreResult<Option<Message>> {
        let row = sqlx::query("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        row.as_ref().map(Self::row_to_message).transpose()
    }

    async fn get_parent_session(&self, parent_message_id: i64) -> CoreResult<Option<String>> {
        let row = sqlx::query("SELECT session_id FROM messages WHERE id = ?")
            .bind(parent_message_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        row.map(|r| r.try_get("session_id").map_err(Self::map_sqlx_err)).transpose()
    }

    async fn list_messages(&self, session_id: &str) -> CoreResult<Vec<Message>> {
        let rows = sqlx::query("SELECT * FROM messages WHERE session_id = ? ORDER BY timestamp ASC, id ASC")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        rows.iter().map(Self::row_to_message).collect()
    }

    async fn list_messages_page(&self, session_id: &str, offset: i64, limit: i64) -> CoreResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE session_id = ? ORDER BY timestamp ASC, id ASC LIMIT ? OFFSET ?",
        )
        .bind(session_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        rows.iter().map(Self::row_to_message).collect()
    }

    async fn upsert_memory(&self, record: &AgentMemory, overwrite: bool) -> CoreResult<bool> {
        let existing = self.get_memory(&record.agent_id, record.session_id.as_deref(), &record.key).await?;
        if existing.is_some() && !overwrite {
            return Ok(false);
        }
        sqlx::query(
            "INSERT INTO agent_memory (agent_id, session_id, key, value, metadata, created_at, updated_at, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (agent_id, session_id, key) DO UPDATE SET \
                value = excluded.value, metadata = excluded.metadata, \
                updated_at = excluded.updated_at, expires_at = excluded.expires_at",
        )
        .bind(&record.agent_id)
        .bind(memory_scope_column(record.session_id.as_deref()))
        .bind(&record.key)
        .bind(&record.value)
        .bind(record.metadata.to_string())
        .bind(crate::time::format(record.created_at))
        .bind(crate::time::format(record.updated_at))
        .bind(record.expires_at.map(crate::time::format))
        .execute(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        Ok(true)
    }

    async fn get_memory(&self, agent_id: &str, session_id: Option<&str>, key: &str) -> CoreResult<Option<AgentMemory>> {
        let row = sqlx::query(
            "SELECT * FROM agent_memory WHERE agent_id = ? AND session_id = ? AND key = ?",
        )
        .bind(agent_id)
        .bind(memory_scope_column(session_id))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        row.as_ref().map(Self::row_to_memory).transpose()
    }

    async fn list_memory(&self, agent_id: &str, session_id: Option<&str>, prefix: Option<&str>) -> CoreResult<Vec<AgentMemory>> {
        let like_pattern = prefix.map(|p| format!("{p}%"));
        let rows = sqlx::query(
            "SELECT * FROM agent_memory WHERE agent_id = ? AND session_id = ? \
             AND (? IS NULL OR key LIKE ?) ORDER BY key ASC",
        )
        .bind(agent_id)
        .bind(memory_scope_column(session_id))
        .bind(&like_pattern)
        .bind(&like_pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        rows.iter().map(Self::row_to_memory).collect()
    }

    async fn delete_memory(&self, agent_id: &str, session_id: Option<&str>, key: &str) -> CoreResult<bool> {
        let result = sqlx::query("DELETE FROM agent_memory WHERE agent_id = ? AND session_id = ? AND key = ?")
            .bind(agent_id)
            .bind(memory_scope_column(session_id))
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired_memory(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM agent_memory WHERE expires_at IS NOT NULL AND expires_at < ?")
            .bind(crate::time::format(now))
            .execute(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        Ok(result.rows_affected())
    }

    async fn delete_memory_for_session(&self, session_id: &str) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM agent_memory WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        Ok(result.rows_affected())
    }

    async fn insert_token(&self, token: &SecureToken) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO secure_tokens (token_id, encrypted_jwt, nonce, agent_id, expires_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&token.token_id)
        .bind(&token.encrypted_jwt)
        .bind(&token.nonce)
        .bind(&token.agent_id)
        .bind(crate::time::format(token.expires_at))
        .bind(crate::time::format(token.created_at))
        .execute(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        Ok(())
    }

    async fn get_token(&self, token_id: &str) -> CoreResult<Option<SecureToken>> {
        let row = sqlx::query("SELECT * FROM secure_tokens WHERE token_id = ?")
            .bind(token_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        row.as_ref().map(Self::row_to_token).transpose()
    }

    async fn delete_token(&self, token_id: &str) -> CoreResult<()> {
        sqlx::query("DELETE FROM secure_tokens WHERE token_id = ?")
            .bind(token_id)
            .execute(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        Ok(())
    }

    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM secure_tokens WHERE expires_at < ?")
            .bind(crate::time::format(now))
            .execute(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        Ok(result.rows_affected())
    }

    async fn any_tokens_exist(&self) -> CoreResult<bool> {
        let row = sqlx::query("SELECT COUNT(*) as c FROM secure_tokens")
            .fetch_one(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        let count: i64 = row.try_get("c").map_err(Self::map_sqlx_err)?;
        Ok(count > 0)
    }

    async fn append_audit(&self, event: &AuditEvent) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO audit_log (timestamp, event_type, agent_id, session_id, resource, action, result, metadata) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(crate::time::format(event.timestamp))
        .bind(&event.event_type)
        .bind(&event.agent_id)
        .bind(&event.session_id)
        .bind(&event.resource)
        .bind(&event.action)
        .bind(&event.result)
        .bind(event.metadata.to_string())
        .execute(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_context_protocol::validate::generate_session_id;

    async fn open_temp() -> SqliteStorage {
        let path = std::env::temp_dir().join(format!("scs_test_{}.db", uuid::Uuid::new_v4()));
        let storage = SqliteStorage::connect(&format!("sqlite://{}?mode=rwc", path.display()))
            .await
            .expect("open store");
        storage.migrate().await.expect("migrate");
        storage
    }

    #[tokio::test]
    async fn insert_and_get_session_round_trips() {
        let storage = open_temp().await;
        let now = crate::time::now();
        let session = Session {
            id: generate_session_id(),
            purpose: "test".into(),
            created_by: "agent-1".into(),
            created_at: now,
            updated_at: now,
            is_active: true,
            metadata: serde_json::json!({}),
        };
        storage.insert_session(&session).await.unwrap();
        let loaded = storage.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.purpose, "test");
    }

    #[tokio::test]
    async fn message_ordering_is_timestamp_then_id() {
        let storage = open_temp().await;
        let now = crate::time::now();
        let session = Session {
            id: generate_session_id(),
            purpose: "p".into(),
            created_by: "a".into(),
            created_at: now,
            updated_at: now,
            is_active: true,
            metadata: serde_json::json!({}),
        };
        storage.insert_session(&session).await.unwrap();

        for content in ["first", "second", "third"] {
            storage
                .insert_message(&NewMessage {
                    session_id: session.id.clone(),
                    sender: "a".into(),
                    content: content.into(),
                    visibility: Visibility::Public,
                    message_type: MessageType::AgentResponse,
                    metadata: serde_json::json!({}),
                    timestamp: now,
                    parent_message_id: None,
                })
                .await
                .unwrap();
        }

        let messages = storage.list_messages(&session.id).await.unwrap();
        assert_eq!(messages.len(), 3);
        assert!(messages[0].id < messages[1].id);
        assert!(messages[1].id < messages[2].id);
    }

    #[tokio::test]
    async fn memory_upsert_respects_overwrite_flag() {
        let storage = open_temp().await;
        let now = crate::time::now();
        let record = AgentMemory {
            agent_id: "a".into(),
            session_id: None,
            key: "k".into(),
            value: "\"v1\"".into(),
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
            expires_at: None,
        };
        assert!(storage.upsert_memory(&record, true).await.unwrap());

        let mut again = record.clone();
        again.value = "\"v2\"".into();
        assert!(!storage.upsert_memory(&again, false).await.unwrap());

        let loaded = storage.get_memory("a", None, "k").await.unwrap().unwrap();
        assert_eq!(loaded.value, "\"v1\"");

        assert!(storage.upsert_memory(&again, true).await.unwrap());
        let loaded = storage.get_memory("a", None, "k").await.unwrap().unwrap();
        assert_eq!(loaded.value, "\"v2\"");
    }

    #[tokio::test]
    async fn session_delete_cascades_to_messages_and_memory() {
        let storage = open_temp().await;
        let now = crate::time::now();
        let session = Session {
            id: generate_session_id(),
            purpose: "p".into(),
            created_by: "a".into(),
            created_at: now,
            updated_at: now,
            is_active: true,
            metadata: serde_json::json!({}),
        };
        storage.insert_session(&session).await.unwrap();
        storage
            .insert_message(&NewMessage {
                session_id: session.id.clone(),
                sender: "a".into(),
                content: "x".into(),
                visibility: Visibility::Public,
                message_type: MessageType::AgentResponse,
                metadata: serde_json::json!({}),
                timestamp: now,
                parent_message_id: None,
            })
            .await
            .unwrap();
        storage
            .upsert_memory(
                &AgentMemory {
                    agent_id: "a".into(),
                    session_id: Some(session.id.clone()),
                    key: "k".into(),
                    value: "\"v\"".into(),
                    metadata: serde_json::json!({}),
                    created_at: now,
                    updated_at: now,
                    expires_at: None,
                },
                true,
            )
            .await
            .unwrap();

        storage.delete_session(&session.id).await.unwrap();
        assert!(storage.get_session(&session.id).await.unwrap().is_none());
        assert!(storage.list_messages(&session.id).await.unwrap().is_empty());
        assert!(storage.get_memory("a", Some(&session.id), "k").await.unwrap().is_none());
    }
}
