//! JWT issuance and verification. Claims are signed HS256; the signed
//! token is never persisted or returned to the client on its own — it is
//! always wrapped by [`crate::crypto`] before being written to storage.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared_context_protocol::{CoreError, CoreResult, Permission};

pub const ISSUER: &str = "shared-context-server";
pub const AUDIENCE: &str = "mcp-shared-context-server";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub agent_id: String,
    pub agent_type: String,
    pub permissions: Vec<String>,
}

impl Claims {
    pub fn permission_set(&self) -> HashSet<Permission> {
        self.permissions.iter().filter_map(|p| Permission::parse(p)).collect()
    }
}

pub fn sign(
    signing_key: &[u8],
    token_id: &str,
    agent_id: &str,
    agent_type: &str,
    permissions: &HashSet<Permission>,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> CoreResult<String> {
    let claims = Claims {
        iss: ISSUER.to_string(),
        aud: AUDIENCE.to_string(),
        iat: issued_at.timestamp(),
        exp: expires_at.timestamp(),
        jti: token_id.to_string(),
        agent_id: agent_id.to_string(),
        agent_type: agent_type.to_string(),
        permissions: permissions.iter().map(|p| p.as_str().to_string()).collect(),
    };
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(signing_key))
        .map_err(|e| CoreError::internal(format!("failed to sign token: {e}")))
}

/// Verify signature, issuer, audience, and expiry. Does not consult storage
/// for revocation; callers check that separately against the token store.
pub fn verify(signing_key: &[u8], jwt: &str) -> CoreResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[AUDIENCE]);
    validation.set_issuer(&[ISSUER]);
    let data = jsonwebtoken::decode::<Claims>(jwt, &DecodingKey::from_secret(signing_key), &validation)
        .map_err(|_| CoreError::unauthenticated("invalid or expired token"))?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn signs_and_verifies_round_trip() {
        let key = b"test-signing-key-0123456789abcdef";
        let now = Utc::now();
        let perms = HashSet::from([Permission::Read, Permission::Write]);
        let jwt = sign(key, "tok1", "agent-1", "generic", &perms, now, now + Duration::minutes(30)).unwrap();
        let claims = verify(key, &jwt).unwrap();
        assert_eq!(claims.agent_id, "agent-1");
        assert_eq!(claims.jti, "tok1");
        assert_eq!(claims.permission_set(), perms);
    }

    #[test]
    fn rejects_expired_token() {
        let key = b"test-signing-key-0123456789abcdef";
        let now = Utc::now();
        let perms = HashSet::new();
        let jwt = sign(key, "tok1", "agent-1", "generic", &perms, now - Duration::hours(2), now - Duration::hours(1)).unwrap();
        assert!(verify(key, &jwt).is_err());
    }

    #[test]
    fn rejects_tampered_signature() {
        let key = b"test-signing-key-0123456789abcdef";
        let other_key = b"a-completely-different-key-abcdef";
        let now = Utc::now();
        let jwt = sign(key, "tok1", "agent-1", "generic", &HashSet::new(), now, now + Duration::minutes(30)).unwrap();
        assert!(verify(other_key, &jwt).is_err());
    }
}
