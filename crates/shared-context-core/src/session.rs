//! Session Engine: create/list/get/touch, backed by [`Storage`] and
//! fronted by the sessions cache segment.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use shared_context_protocol::validate::{generate_session_id, validate_metadata_size, validate_purpose};
use shared_context_protocol::{CoreError, CoreResult, Identity, Permission, Session};
use shared_context_storage::Storage;

use crate::audit::AuditLog;
use crate::cache::Cache;

pub struct SessionEngine {
    storage: Arc<dyn Storage>,
    cache: Arc<Cache>,
    audit: Arc<AuditLog>,
}

impl SessionEngine {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<Cache>, audit: Arc<AuditLog>) -> Self {
        Self { storage, cache, audit }
    }

    pub async fn create(&self, identity: &Identity, purpose: &str, metadata: Value) -> CoreResult<String> {
        if !identity.has(Permission::Write) {
            self.audit
                .record("authorization", &identity.agent_id, None, None, Some("create_session"), "permission_denied", serde_json::json!({}))
                .await
                .ok();
            return Err(CoreError::permission_denied("create_session requires write permission"));
        }
        validate_purpose(purpose)?;
        validate_metadata_size(&metadata)?;

        let now = Utc::now();
        let session = Session {
            id: generate_session_id(),
            purpose: purpose.trim().to_string(),
            created_by: identity.agent_id.clone(),
            created_at: now,
            updated_at: now,
            is_active: true,
            metadata,
        };
        self.storage.insert_session(&session).await?;

        self.audit
            .record(
                "session_created",
                &identity.agent_id,
                Some(&session.id),
                Some(&format!("session://{}", session.id)),
                Some("create"),
                "success",
                serde_json::json!({}),
            )
            .await?;

        Ok(session.id)
    }

    pub async fn get(&self, session_id: &str) -> CoreResult<Session> {
        if let Some(cached) = self.cache.get_session(session_id).await {
            if let Ok(session) = serde_json::from_value(cached) {
                return Ok(session);
            }
        }
        let session = self
            .storage
            .get_session(session_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("session {session_id} not found")))?;
        if let Ok(value) = serde_json::to_value(&session) {
            self.cache.put_session(session_id, value).await;
        }
        Ok(session)
    }

    pub async fn list(&self, identity: &Identity, offset: i64, limit: i64) -> CoreResult<Vec<Session>> {
        self.storage.list_sessions_for_agent(&identity.agent_id, offset, limit).await
    }

    /// Bumps `updated_at` to now; called internally by the Message Engine
    /// after every successful append.
    pub async fn touch(&self, session_id: &str) -> CoreResult<()> {
        self.storage.touch_session(session_id, Utc::now()).await?;
        self.cache.invalidate_session(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_context_storage::sqlite::SqliteStorage;
    use std::collections::HashSet;

    async fn engine() -> SessionEngine {
        let path = std::env::temp_dir().join(format!("scs_session_test_{}.db", uuid::Uuid::new_v4()));
        let backend = SqliteStorage::connect(&format!("sqlite://{}?mode=rwc", path.display())).await.unwrap();
        backend.migrate().await.unwrap();
        let storage: Arc<dyn Storage> = Arc::new(backend);
        SessionEngine::new(storage.clone(), Arc::new(Cache::new()), Arc::new(AuditLog::new(storage)))
    }

    #[tokio::test]
    async fn create_requires_write_permission() {
        let engine = engine().await;
        let identity = Identity::new("a1", "generic", HashSet::new(), "t1");
        assert!(engine.create(&identity, "purpose", serde_json::json!({})).await.is_err());
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let engine = engine().await;
        let identity = Identity::new("a1", "generic", HashSet::from([Permission::Write]), "t1");
        let id = engine.create(&identity, "coordinate work", serde_json::json!({})).await.unwrap();
        let session = engine.get(&id).await.unwrap();
        assert_eq!(session.purpose, "coordinate work");
        assert_eq!(session.created_by, "a1");
    }

    #[tokio::test]
    async fn get_missing_session_is_not_found() {
        let engine = engine().await;
        assert!(engine.get("session_0000000000000000").await.is_err());
    }

    #[tokio::test]
    async fn touch_bumps_updated_at() {
        let engine = engine().await;
        let identity = Identity::new("a1", "generic", HashSet::from([Permission::Write]), "t1");
        let id = engine.create(&identity, "p", serde_json::json!({})).await.unwrap();
        let before = engine.get(&id).await.unwrap().updated_at;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        engine.touch(&id).await.unwrap();
        let after = engine.get(&id).await.unwrap().updated_at;
        assert!(after >= before);
    }
}
