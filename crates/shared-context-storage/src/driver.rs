//! The Storage Backend contract: one logical SQL store, presented
//! identically by every driver. Engines in `shared-context-core` and
//! `shared-context-auth` depend on this trait, never on a concrete pool type.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_context_protocol::{AgentMemory, AuditEvent, CoreResult, Message, MessageType, SecureToken, Session, Visibility};

/// `agent_memory.session_id` storage value standing in for "no session"
/// (global scope). Real session ids are never empty, so this never collides.
pub const GLOBAL_MEMORY_SCOPE: &str = "";

/// Maps the domain `Option<&str>` session scope onto the sentinel column
/// value every driver stores.
#[must_use]
pub fn memory_scope_column(session_id: Option<&str>) -> &str {
    session_id.unwrap_or(GLOBAL_MEMORY_SCOPE)
}

/// Inverse of [`memory_scope_column`], used when reading rows back.
#[must_use]
pub fn memory_scope_domain(raw: String) -> Option<String> {
    if raw.is_empty() {
        None
    } else {
        Some(raw)
    }
}

/// A page of messages plus the cursor to resume from, or `None` at the end.
#[derive(Debug, Clone)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_id: String,
    pub sender: String,
    pub content: String,
    pub visibility: Visibility,
    pub message_type: MessageType,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub parent_message_id: Option<i64>,
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Apply schema migrations forward in order; idempotent.
    async fn migrate(&self) -> CoreResult<()>;

    /// Cheap liveness probe used by health checks and startup validation.
    async fn ping(&self) -> CoreResult<()>;

    // ---- sessions ---------------------------------------------------

    async fn insert_session(&self, session: &Session) -> CoreResult<()>;
    async fn get_session(&self, id: &str) -> CoreResult<Option<Session>>;
    /// Sessions the agent created or has appended a message to, newest first.
    async fn list_sessions_for_agent(
        &self,
        agent_id: &str,
        offset: i64,
        limit: i64,
    ) -> CoreResult<Vec<Session>>;
    async fn touch_session(&self, id: &str, at: DateTime<Utc>) -> CoreResult<()>;
    async fn delete_session(&self, id: &str) -> CoreResult<()>;

    // ---- messages -----------------------------------------------------

    async fn insert_message(&self, message: &NewMessage) -> CoreResult<i64>;
    async fn get_message_by_id(&self, id: i64) -> CoreResult<Option<Message>>;
    async fn get_parent_session(&self, parent_message_id: i64) -> CoreResult<Option<String>>;
    /// All messages of a session, ordered `(timestamp ASC, id ASC)`. Visibility
    /// filtering happens above this layer; the store returns the full set.
    async fn list_messages(&self, session_id: &str) -> CoreResult<Vec<Message>>;
    async fn list_messages_page(
        &self,
        session_id: &str,
        offset: i64,
        limit: i64,
    ) -> CoreResult<Vec<Message>>;

    // ---- agent memory ---------------------------------------------------

    async fn upsert_memory(&self, record: &AgentMemory, overwrite: bool) -> CoreResult<bool>;
    async fn get_memory(&self, agent_id: &str, session_id: Option<&str>, key: &str) -> CoreResult<Option<AgentMemory>>;
    async fn list_memory(&self, agent_id: &str, session_id: Option<&str>, prefix: Option<&str>) -> CoreResult<Vec<AgentMemory>>;
    async fn delete_memory(&self, agent_id: &str, session_id: Option<&str>, key: &str) -> CoreResult<bool>;
    async fn delete_expired_memory(&self, now: DateTime<Utc>) -> CoreResult<u64>;
    async fn delete_memory_for_session(&self, session_id: &str) -> CoreResult<u64>;

    // ---- tokens ---------------------------------------------------------

    async fn insert_token(&self, token: &SecureToken) -> CoreResult<()>;
    async fn get_token(&self, token_id: &str) -> CoreResult<Option<SecureToken>>;
    async fn delete_token(&self, token_id: &str) -> CoreResult<()>;
    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> CoreResult<u64>;
    async fn any_tokens_exist(&self) -> CoreResult<bool>;

    // ---- audit ------------------------------------------------------

    async fn append_audit(&self, event: &AuditEvent) -> CoreResult<()>;
}
