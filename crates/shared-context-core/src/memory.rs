//! Memory Engine: per-agent KV with optional session scope and TTL.
//! Isolation invariant: a caller may only read or write entries whose
//! `agent_id` equals their own.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use shared_context_protocol::validate::{validate_memory_key, validate_memory_value, validate_metadata_size};
use shared_context_protocol::{AgentMemory, CoreError, CoreResult, Identity, MemoryScope, Permission};
use shared_context_storage::Storage;
use tracing::{info, warn};

use crate::audit::AuditLog;
use crate::cache::Cache;

pub struct MemoryEngine {
    storage: Arc<dyn Storage>,
    cache: Arc<Cache>,
    audit: Arc<AuditLog>,
}

impl MemoryEngine {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<Cache>, audit: Arc<AuditLog>) -> Self {
        Self { storage, cache, audit }
    }

    fn require_self(identity: &Identity, agent_id: &str) -> CoreResult<()> {
        if identity.agent_id != agent_id {
            return Err(CoreError::permission_denied("agents may only access their own memory"));
        }
        Ok(())
    }

    pub async fn set(
        &self,
        identity: &Identity,
        key: &str,
        value: &str,
        session_id: Option<&str>,
        expires_in: Option<Duration>,
        overwrite: bool,
        metadata: serde_json::Value,
    ) -> CoreResult<()> {
        if !identity.has(Permission::Write) {
            self.audit
                .record("memory_set_failed", &identity.agent_id, session_id, Some(key), Some("set"), "permission_denied", serde_json::json!({}))
                .await
                .ok();
            return Err(CoreError::permission_denied("set_memory requires write permission"));
        }
        validate_memory_key(key)?;
        validate_memory_value(value)?;
        validate_metadata_size(&metadata)?;

        // Strings are stored verbatim if already JSON-parseable; otherwise
        // they are wrapped so `get` always returns valid JSON.
        let stored_value = if serde_json::from_str::<serde_json::Value>(value).is_ok() {
            value.to_string()
        } else {
            serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
        };

        let now = Utc::now();
        let record = AgentMemory {
            agent_id: identity.agent_id.clone(),
            session_id: session_id.map(str::to_string),
            key: key.to_string(),
            value: stored_value,
            metadata,
            created_at: now,
            updated_at: now,
            expires_at: expires_in.map(|d| now + chrono::Duration::from_std(d).unwrap_or_default()),
        };

        let wrote = self.storage.upsert_memory(&record, overwrite).await?;
        if !wrote {
            return Err(CoreError::conflict(format!("memory key {key} already exists")));
        }
        self.cache.invalidate_memory(&identity.agent_id);
        self.audit
            .record("memory_set", &identity.agent_id, session_id, Some(key), Some("set"), "success", serde_json::json!({}))
            .await?;
        Ok(())
    }

    pub async fn get(&self, identity: &Identity, key: &str, session_id: Option<&str>) -> CoreResult<AgentMemory> {
        self.sweep_for(&identity.agent_id).await;
        let cache_key = memory_cache_key(session_id, key);
        if let Some(cached) = self.cache.get_memory(&identity.agent_id, &cache_key).await {
            if let Ok(record) = serde_json::from_value(cached) {
                return Ok(record);
            }
        }
        let record = self
            .storage
            .get_memory(&identity.agent_id, session_id, key)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("memory key {key} not found")))?;
        self.cache
            .put_memory(&identity.agent_id, &cache_key, serde_json::to_value(&record).unwrap_or(serde_json::Value::Null))
            .await;
        Ok(record)
    }

    pub async fn list(&self, identity: &Identity, session_id: Option<&str>, scope: MemoryScope, prefix: Option<&str>) -> CoreResult<Vec<AgentMemory>> {
        self.sweep_for(&identity.agent_id).await;
        match scope {
            MemoryScope::Global => self.storage.list_memory(&identity.agent_id, None, prefix).await,
            MemoryScope::Session => self.storage.list_memory(&identity.agent_id, session_id, prefix).await,
            MemoryScope::All => {
                let mut combined = self.storage.list_memory(&identity.agent_id, None, prefix).await?;
                if session_id.is_some() {
                    combined.extend(self.storage.list_memory(&identity.agent_id, session_id, prefix).await?);
                }
                Ok(combined)
            }
        }
    }

    pub async fn delete(&self, identity: &Identity, key: &str, session_id: Option<&str>) -> CoreResult<bool> {
        let deleted = self.storage.delete_memory(&identity.agent_id, session_id, key).await?;
        self.cache.invalidate_memory(&identity.agent_id);
        self.audit
            .record(
                "memory_deleted",
                &identity.agent_id,
                session_id,
                Some(key),
                Some("delete"),
                if deleted { "success" } else { "not_found" },
                serde_json::json!({}),
            )
            .await?;
        Ok(deleted)
    }

    async fn sweep_for(&self, agent_id: &str) {
        // Lazy per-read cleanup; the background sweeper in `spawn_sweeper`
        // handles the global pass every 60s.
        if let Err(err) = self.storage.delete_expired_memory(Utc::now()).await {
            warn!(agent_id, error = %err, "lazy memory expiry sweep failed");
        }
    }

    #[must_use]
    pub fn spawn_sweeper(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                match self.storage.delete_expired_memory(Utc::now()).await {
                    Ok(count) if count > 0 => info!(count, "swept expired memory rows"),
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "memory sweep failed"),
                }
            }
        })
    }
}

/// Enforces the isolation invariant ahead of dispatch into [`MemoryEngine`]:
/// callers never reach storage with a foreign `agent_id`.
pub fn require_caller_owns(identity: &Identity, agent_id: &str) -> CoreResult<()> {
    MemoryEngine::require_self(identity, agent_id)
}

fn memory_cache_key(session_id: Option<&str>, key: &str) -> String {
    format!("{}:{key}", session_id.unwrap_or("-"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_context_storage::sqlite::SqliteStorage;
    use std::collections::HashSet;

    async fn engine() -> MemoryEngine {
        let path = std::env::temp_dir().join(format!("scs_memory_test_{}.db", uuid::Uuid::new_v4()));
        let backend = SqliteStorage::connect(&format!("sqlite://{}?mode=rwc", path.display())).await.unwrap();
        backend.migrate().await.unwrap();
        let storage: Arc<dyn Storage> = Arc::new(backend);
        let audit = Arc::new(AuditLog::new(storage.clone()));
        MemoryEngine::new(storage, Arc::new(Cache::new()), audit)
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let engine = engine().await;
        let identity = Identity::new("a1", "generic", HashSet::from([Permission::Write]), "t1");
        engine.set(&identity, "progress", "\"halfway\"", None, None, true, serde_json::json!({})).await.unwrap();
        let record = engine.get(&identity, "progress", None).await.unwrap();
        assert_eq!(record.value, "\"halfway\"");
    }

    #[tokio::test]
    async fn overwrite_false_rejects_existing_key() {
        let engine = engine().await;
        let identity = Identity::new("a1", "generic", HashSet::from([Permission::Write]), "t1");
        engine.set(&identity, "k", "\"v1\"", None, None, true, serde_json::json!({})).await.unwrap();
        let result = engine.set(&identity, "k", "\"v2\"", None, None, false, serde_json::json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn expired_entry_is_not_returned() {
        let engine = engine().await;
        let identity = Identity::new("a1", "generic", HashSet::from([Permission::Write]), "t1");
        engine
            .set(&identity, "ephemeral", "\"gone soon\"", None, Some(Duration::from_millis(1)), true, serde_json::json!({}))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(engine.get(&identity, "ephemeral", None).await.is_err());
    }

    #[test]
    fn require_self_rejects_foreign_agent_id() {
        let identity = Identity::new("a1", "generic", HashSet::new(), "t1");
        assert!(require_caller_owns(&identity, "a2").is_err());
        assert!(require_caller_owns(&identity, "a1").is_ok());
    }
}
