//! Message Engine: append, paginated reads under the visibility
//! rule, and `(timestamp ASC, id ASC)` ordering.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde_json::Value;
use shared_context_auth::{is_visible_with_filter, VisibilityFilter};
use shared_context_protocol::sanitize::{redact_sensitive_metadata, sanitize_text};
use shared_context_protocol::validate::{validate_content, validate_metadata_size};
use shared_context_protocol::{CoreError, CoreResult, Identity, Message, MessageType, Permission, Visibility};
use shared_context_storage::{NewMessage, Storage};

use crate::audit::AuditLog;
use crate::cache::Cache;
use crate::notification::{HubEvent, NotificationHub};
use crate::session::SessionEngine;

pub struct MessagePage {
    pub messages: Vec<Message>,
    pub next_cursor: Option<String>,
}

/// Cache key sentinel for "the whole session's message list", distinct from
/// any real offset/limit pagination request.
const ALL_MESSAGES_LIMIT: i64 = -1;

pub struct MessageEngine {
    storage: Arc<dyn Storage>,
    cache: Arc<Cache>,
    audit: Arc<AuditLog>,
    hub: NotificationHub,
    sessions: Arc<SessionEngine>,
}

impl MessageEngine {
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        cache: Arc<Cache>,
        audit: Arc<AuditLog>,
        hub: NotificationHub,
        sessions: Arc<SessionEngine>,
    ) -> Self {
        Self { storage, cache, audit, hub, sessions }
    }

    pub async fn append(
        &self,
        identity: &Identity,
        session_id: &str,
        content: &str,
        visibility: Visibility,
        message_type: MessageType,
        metadata: Value,
        parent_message_id: Option<i64>,
    ) -> CoreResult<i64> {
        if !identity.has(Permission::Write) {
            self.audit
                .record("message_add_failed", &identity.agent_id, Some(session_id), None, Some("append"), "permission_denied", serde_json::json!({}))
                .await
                .ok();
            return Err(CoreError::permission_denied("add_message requires write permission"));
        }

        if self.storage.get_session(session_id).await?.is_none() {
            return Err(CoreError::not_found(format!("session {session_id} not found")));
        }

        let sanitized = sanitize_text(content);
        validate_content(&sanitized)?;

        if let Some(parent_id) = parent_message_id {
            let parent_session = self.storage.get_parent_session(parent_id).await?;
            if parent_session.as_deref() != Some(session_id) {
                return Err(CoreError::validation("parent_message_id must reference a message in the same session"));
            }
        }

        validate_metadata_size(&metadata)?;
        let metadata = redact_sensitive_metadata(metadata);

        let message_id = self
            .storage
            .insert_message(&NewMessage {
                session_id: session_id.to_string(),
                sender: identity.agent_id.clone(),
                content: sanitized,
                visibility,
                message_type,
                metadata,
                timestamp: Utc::now(),
                parent_message_id,
            })
            .await?;

        self.sessions.touch(session_id).await?;
        self.cache.invalidate_messages(session_id);
        self.cache.invalidate_search(session_id);

        self.hub
            .publish(
                &format!("session://{session_id}"),
                HubEvent::MessageAdded {
                    uri: format!("session://{session_id}"),
                    payload: serde_json::json!({"message_id": message_id}),
                },
            )
            .await;

        self.audit
            .record(
                "message_added",
                &identity.agent_id,
                Some(session_id),
                Some(&format!("session://{session_id}")),
                Some("append"),
                "success",
                serde_json::json!({"message_id": message_id}),
            )
            .await?;

        Ok(message_id)
    }

    pub async fn get_by_id(&self, identity: &Identity, message_id: i64) -> CoreResult<Message> {
        let message = self
            .storage
            .get_message_by_id(message_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("message {message_id} not found")))?;
        if !is_visible_with_filter(identity, &message, None) {
            return Err(CoreError::not_found(format!("message {message_id} not found")));
        }
        Ok(message)
    }

    /// Offset-based page for dashboards; `visibility_filter` narrows the
    /// baseline visibility rule further.
    pub async fn get_page(
        &self,
        identity: &Identity,
        session_id: &str,
        offset: i64,
        limit: i64,
        visibility_filter: Option<VisibilityFilter>,
    ) -> CoreResult<Vec<Message>> {
        let all = self.all_messages(session_id).await?;
        let visible: Vec<Message> = all
            .into_iter()
            .filter(|m| is_visible_with_filter(identity, m, visibility_filter))
            .collect();
        let start = offset.max(0) as usize;
        Ok(visible.into_iter().skip(start).take(limit.max(0) as usize).collect())
    }

    /// Full, unfiltered message set for a session, read through the cache.
    /// Visibility filtering happens per caller on top of this, never inside
    /// it, so the cached entry is safe to share across identities.
    async fn all_messages(&self, session_id: &str) -> CoreResult<Vec<Message>> {
        if let Some(cached) = self.cache.get_message_page(session_id, 0, ALL_MESSAGES_LIMIT).await {
            if let Ok(messages) = serde_json::from_value(cached) {
                return Ok(messages);
            }
        }
        let all = self.storage.list_messages(session_id).await?;
        self.cache
            .put_message_page(session_id, 0, ALL_MESSAGES_LIMIT, serde_json::to_value(&all).unwrap_or(Value::Null))
            .await;
        Ok(all)
    }

    /// Cursor-based page: the cursor encodes `message_id:timestamp` of the
    /// last row returned, so a reader can resume in O(log n) regardless of
    /// how deep into the session they are.
    pub async fn get_page_cursor(
        &self,
        identity: &Identity,
        session_id: &str,
        cursor: Option<&str>,
        limit: i64,
        visibility_filter: Option<VisibilityFilter>,
    ) -> CoreResult<MessagePage> {
        let after_id = cursor.map(decode_cursor).transpose()?;

        let all = self.all_messages(session_id).await?;
        let visible: Vec<Message> = all
            .into_iter()
            .filter(|m| is_visible_with_filter(identity, m, visibility_filter))
            .filter(|m| after_id.is_none_or(|after| m.id > after))
            .collect();

        let limit = limit.max(1) as usize;
        let page: Vec<Message> = visible.into_iter().take(limit).collect();
        let next_cursor = page.last().map(|m| encode_cursor(m.id, m.timestamp));

        Ok(MessagePage { messages: page, next_cursor })
    }
}

fn encode_cursor(message_id: i64, timestamp: chrono::DateTime<Utc>) -> String {
    BASE64.encode(format!("{message_id}:{}", shared_context_storage::time::format(timestamp)))
}

fn decode_cursor(cursor: &str) -> CoreResult<i64> {
    let decoded = BASE64
        .decode(cursor)
        .map_err(|_| CoreError::validation("invalid cursor"))?;
    let decoded = String::from_utf8(decoded).map_err(|_| CoreError::validation("invalid cursor"))?;
    let (id_part, _) = decoded.split_once(':').ok_or_else(|| CoreError::validation("invalid cursor"))?;
    id_part.parse().map_err(|_| CoreError::validation("invalid cursor"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_context_storage::sqlite::SqliteStorage;
    use std::collections::HashSet;

    async fn setup() -> (MessageEngine, String) {
        let path = std::env::temp_dir().join(format!("scs_message_test_{}.db", uuid::Uuid::new_v4()));
        let backend = SqliteStorage::connect(&format!("sqlite://{}?mode=rwc", path.display())).await.unwrap();
        backend.migrate().await.unwrap();
        let storage: Arc<dyn Storage> = Arc::new(backend);
        let cache = Arc::new(Cache::new());
        let audit = Arc::new(AuditLog::new(storage.clone()));
        let sessions = Arc::new(SessionEngine::new(storage.clone(), cache.clone(), audit.clone()));
        let identity = Identity::new("a1", "generic", HashSet::from([Permission::Write]), "t1");
        let session_id = sessions.create(&identity, "p", serde_json::json!({})).await.unwrap();
        let hub = NotificationHub::new();
        (MessageEngine::new(storage, cache, audit, hub, sessions), session_id)
    }

    #[tokio::test]
    async fn append_then_get_by_id() {
        let (engine, session_id) = setup().await;
        let identity = Identity::new("a1", "generic", HashSet::from([Permission::Write]), "t1");
        let id = engine
            .append(&identity, &session_id, "hello", Visibility::Public, MessageType::AgentResponse, serde_json::json!({}), None)
            .await
            .unwrap();
        let message = engine.get_by_id(&identity, id).await.unwrap();
        assert_eq!(message.content, "hello");
    }

    #[tokio::test]
    async fn private_message_hidden_from_other_agents() {
        let (engine, session_id) = setup().await;
        let owner = Identity::new("a1", "generic", HashSet::from([Permission::Write]), "t1");
        let other = Identity::new("a2", "generic", HashSet::from([Permission::Write]), "t2");
        let id = engine
            .append(&owner, &session_id, "secret", Visibility::Private, MessageType::AgentResponse, serde_json::json!({}), None)
            .await
            .unwrap();
        assert!(engine.get_by_id(&other, id).await.is_err());
        assert!(engine.get_by_id(&owner, id).await.is_ok());
    }

    #[tokio::test]
    async fn cursor_pagination_advances_monotonically() {
        let (engine, session_id) = setup().await;
        let identity = Identity::new("a1", "generic", HashSet::from([Permission::Write]), "t1");
        for i in 0..5 {
            engine
                .append(&identity, &session_id, &format!("msg {i}"), Visibility::Public, MessageType::AgentResponse, serde_json::json!({}), None)
                .await
                .unwrap();
        }
        let first_page = engine.get_page_cursor(&identity, &session_id, None, 2, None).await.unwrap();
        assert_eq!(first_page.messages.len(), 2);
        let cursor = first_page.next_cursor.unwrap();
        let second_page = engine.get_page_cursor(&identity, &session_id, Some(&cursor), 2, None).await.unwrap();
        assert_eq!(second_page.messages.len(), 2);
        assert!(second_page.messages[0].id > first_page.messages[1].id);
    }

    #[tokio::test]
    async fn parent_must_belong_to_same_session() {
        let (engine, session_id) = setup().await;
        let identity = Identity::new("a1", "generic", HashSet::from([Permission::Write]), "t1");
        assert!(engine
            .append(&identity, &session_id, "x", Visibility::Public, MessageType::AgentResponse, serde_json::json!({}), Some(9_999_999))
            .await
            .is_err());
    }
}
