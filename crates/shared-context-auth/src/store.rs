//! Identity & Token Store: issue, validate, refresh, revoke, and a
//! background sweep of expired rows. Modeled on the provider/session-map
//! shape of an auth manager, but backed by the shared `Storage` trait
//! instead of an in-memory map so tokens survive a restart.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use shared_context_protocol::sanitize::redact_sensitive_metadata;
use shared_context_protocol::{AuditEvent, CoreError, CoreResult, Identity, Permission, SecureToken};
use shared_context_storage::Storage;
use tracing::{info, warn};

use crate::crypto::AeadKey;
use crate::jwt;

pub struct IssuedToken {
    pub token_id: String,
    pub plaintext_token: String,
    pub expires_at: chrono::DateTime<Utc>,
}

pub struct TokenStore {
    storage: Arc<dyn Storage>,
    signing_key: Vec<u8>,
    aead_key: AeadKey,
    default_ttl: Duration,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn Storage>, signing_key: Vec<u8>, aead_key_bytes: &[u8], default_ttl: Duration) -> CoreResult<Self> {
        Ok(Self {
            storage,
            signing_key,
            aead_key: AeadKey::from_bytes(aead_key_bytes)?,
            default_ttl,
        })
    }

    /// Records directly against storage rather than through
    /// `shared-context-core`'s `AuditLog`, since that crate depends on this
    /// one for authorization and a reverse dependency would cycle.
    async fn audit(&self, event_type: &str, agent_id: &str, result: &str) {
        let event = AuditEvent {
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            agent_id: agent_id.to_string(),
            session_id: None,
            resource: None,
            action: None,
            result: result.to_string(),
            metadata: redact_sensitive_metadata(serde_json::json!({})),
        };
        info!(audit = %serde_json::to_string(&event).unwrap_or_default(), "audit event");
        if let Err(err) = self.storage.append_audit(&event).await {
            warn!(error = %err, "failed to persist audit event");
        }
    }

    pub async fn issue(
        &self,
        agent_id: &str,
        agent_type: &str,
        permissions: std::collections::HashSet<Permission>,
        ttl: Option<Duration>,
    ) -> CoreResult<IssuedToken> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let token_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::minutes(30));

        let jwt = jwt::sign(&self.signing_key, &token_id, agent_id, agent_type, &permissions, now, expires_at)?;
        let (encrypted_jwt, nonce) = self.aead_key.encrypt(jwt.as_bytes())?;

        self.storage
            .insert_token(&SecureToken {
                token_id: token_id.clone(),
                encrypted_jwt,
                nonce,
                agent_id: agent_id.to_string(),
                expires_at,
                created_at: now,
            })
            .await?;

        self.audit("authentication", agent_id, "success").await;

        Ok(IssuedToken {
            token_id,
            plaintext_token: jwt,
            expires_at,
        })
    }

    /// Decrypt, verify signature/audience/issuer/expiry, and confirm the
    /// backing record has not been revoked.
    pub async fn validate(&self, plaintext_token: &str) -> CoreResult<Identity> {
        let claims = jwt::verify(&self.signing_key, plaintext_token)?;

        let record = self
            .storage
            .get_token(&claims.jti)
            .await?
            .ok_or_else(|| CoreError::unauthenticated("token has been revoked"))?;

        if record.expires_at < Utc::now() {
            return Err(CoreError::unauthenticated("token expired"));
        }

        // The plaintext the caller presented must actually be the record we
        // issued, not merely a well-formed JWT signed with our key.
        let stored_plaintext = self.aead_key.decrypt(&record.encrypted_jwt, &record.nonce)?;
        if stored_plaintext != plaintext_token.as_bytes() {
            return Err(CoreError::unauthenticated("token does not match issued record"));
        }

        let permission_set = claims.permission_set();
        let identity = Identity::new(claims.agent_id, claims.agent_type, permission_set, claims.jti);
        self.audit("authentication", &identity.agent_id, "success").await;
        Ok(identity)
    }

    /// Only permitted if the presented token is valid and carries
    /// `refresh_token`; the previous record is replaced atomically.
    pub async fn refresh(&self, plaintext_token: &str) -> CoreResult<IssuedToken> {
        let identity = self.validate(plaintext_token).await?;
        if !identity.has(Permission::RefreshToken) {
            return Err(CoreError::permission_denied("token lacks refresh_token permission"));
        }
        let issued = self
            .issue(&identity.agent_id, &identity.agent_type, identity.permissions.clone(), None)
            .await?;
        self.storage.delete_token(&identity.token_id).await?;
        self.audit("token_refreshed", &identity.agent_id, "success").await;
        Ok(issued)
    }

    pub async fn revoke(&self, token_id: &str) -> CoreResult<()> {
        let agent_id = self.storage.get_token(token_id).await?.map(|t| t.agent_id);
        self.storage.delete_token(token_id).await?;
        self.audit("token_revoked", agent_id.as_deref().unwrap_or("unknown"), "success").await;
        Ok(())
    }

    pub async fn any_tokens_exist(&self) -> CoreResult<bool> {
        self.storage.any_tokens_exist().await
    }

    /// Spawns the background sweep that deletes expired rows every 60s.
    /// Mirrors the cleanup-task pattern: a detached task holding an `Arc`
    /// back to shared state, running until the process exits.
    pub fn spawn_sweeper(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                match self.storage.delete_expired_tokens(Utc::now()).await {
                    Ok(count) if count > 0 => info!(count, "swept expired tokens"),
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "token sweep failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_context_storage::sqlite::SqliteStorage;

    async fn store() -> TokenStore {
        let path = std::env::temp_dir().join(format!("scs_auth_test_{}.db", uuid::Uuid::new_v4()));
        let backend = SqliteStorage::connect(&format!("sqlite://{}?mode=rwc", path.display())).await.unwrap();
        backend.migrate().await.unwrap();
        TokenStore::new(Arc::new(backend), b"0123456789abcdef0123456789abcdef".to_vec(), &[9u8; 32], Duration::from_secs(1800)).unwrap()
    }

    #[tokio::test]
    async fn issue_then_validate_round_trips_identity() {
        let store = store().await;
        let issued = store
            .issue("agent-1", "generic", std::collections::HashSet::from([Permission::Read]), None)
            .await
            .unwrap();
        let identity = store.validate(&issued.plaintext_token).await.unwrap();
        assert_eq!(identity.agent_id, "agent-1");
        assert!(identity.has(Permission::Read));
    }

    #[tokio::test]
    async fn revoked_token_fails_validation() {
        let store = store().await;
        let issued = store.issue("agent-1", "generic", std::collections::HashSet::new(), None).await.unwrap();
        store.revoke(&issued.token_id).await.unwrap();
        assert!(store.validate(&issued.plaintext_token).await.is_err());
    }

    #[tokio::test]
    async fn refresh_requires_permission() {
        let store = store().await;
        let issued = store.issue("agent-1", "generic", std::collections::HashSet::new(), None).await.unwrap();
        assert!(store.refresh(&issued.plaintext_token).await.is_err());
    }

    #[tokio::test]
    async fn refresh_rotates_token_and_invalidates_old() {
        let store = store().await;
        let issued = store
            .issue("agent-1", "generic", std::collections::HashSet::from([Permission::RefreshToken]), None)
            .await
            .unwrap();
        let rotated = store.refresh(&issued.plaintext_token).await.unwrap();
        assert!(store.validate(&issued.plaintext_token).await.is_err());
        assert!(store.validate(&rotated.plaintext_token).await.is_ok());
    }
}
