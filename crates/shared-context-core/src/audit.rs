//! Audit Log: append-only record of authentication, authorization,
//! and mutating operations. Every call both persists the event and emits a
//! structured `tracing` line so operators without storage access still see
//! security-relevant activity in real time.

use chrono::Utc;
use shared_context_protocol::{sanitize::redact_sensitive_metadata, AuditEvent, CoreResult};
use shared_context_storage::Storage;
use std::sync::Arc;
use tracing::info;

pub struct AuditLog {
    storage: Arc<dyn Storage>,
}

impl AuditLog {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn record(
        &self,
        event_type: &str,
        agent_id: &str,
        session_id: Option<&str>,
        resource: Option<&str>,
        action: Option<&str>,
        result: &str,
        metadata: serde_json::Value,
    ) -> CoreResult<()> {
        let metadata = redact_sensitive_metadata(metadata);
        let event = AuditEvent {
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            agent_id: agent_id.to_string(),
            session_id: session_id.map(str::to_string),
            resource: resource.map(str::to_string),
            action: action.map(str::to_string),
            result: result.to_string(),
            metadata,
        };
        info!(audit = %serde_json::to_string(&event).unwrap_or_default(), "audit event");
        self.storage.append_audit(&event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_context_storage::sqlite::SqliteStorage;

    #[tokio::test]
    async fn records_redact_sensitive_metadata() {
        let path = std::env::temp_dir().join(format!("scs_audit_test_{}.db", uuid::Uuid::new_v4()));
        let backend = SqliteStorage::connect(&format!("sqlite://{}?mode=rwc", path.display())).await.unwrap();
        backend.migrate().await.unwrap();
        let storage: Arc<dyn Storage> = Arc::new(backend);
        let log = AuditLog::new(storage);
        log.record(
            "authentication",
            "agent-1",
            None,
            None,
            None,
            "success",
            serde_json::json!({"api_key": "super-secret"}),
        )
        .await
        .unwrap();
    }
}
