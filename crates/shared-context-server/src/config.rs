//! Process configuration: layered over environment variables via the
//! `config` crate. Missing security-critical values are fatal at startup,
//! never defaulted silently.

use std::time::Duration;

use serde::Deserialize;
use shared_context_core::CacheConfig;
use shared_context_protocol::{CoreError, CoreResult};

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// `sqlite://path/to/file.db?mode=rwc` or, with the `postgres` feature,
    /// a `postgres://` DSN.
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Base64-encoded HMAC signing secret for issued JWTs. Required.
    pub jwt_secret_key: String,
    /// Base64-encoded 32-byte AES-256-GCM key. Required.
    pub jwt_encryption_key: String,
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
    /// Bootstrap admin token minted once, on first boot with an empty token
    /// store, so operators have a way in before any agent is authenticated.
    pub api_key: Option<String>,
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_ws_heartbeat_seconds")]
    pub ws_heartbeat_seconds: u64,
    #[serde(default = "default_cache_capacity_sessions")]
    pub cache_capacity_sessions: u64,
    #[serde(default = "default_cache_ttl_sessions")]
    pub cache_ttl_sessions: u64,
    #[serde(default = "default_cache_capacity_message_pages")]
    pub cache_capacity_message_pages: u64,
    #[serde(default = "default_cache_ttl_message_pages")]
    pub cache_ttl_message_pages: u64,
    #[serde(default = "default_cache_capacity_search")]
    pub cache_capacity_search: u64,
    #[serde(default = "default_cache_ttl_search")]
    pub cache_ttl_search: u64,
    #[serde(default = "default_cache_capacity_agent_memory")]
    pub cache_capacity_agent_memory: u64,
    #[serde(default = "default_cache_ttl_agent_memory")]
    pub cache_ttl_agent_memory: u64,
    /// CI runs favor fewer retry attempts over longer backoff; also used to
    /// pick the shorter storage-busy retry policy.
    #[serde(default)]
    pub ci: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

fn default_database_url() -> String {
    "sqlite://shared_context.db?mode=rwc".to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_token_ttl_seconds() -> u64 {
    30 * 60
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ws_heartbeat_seconds() -> u64 {
    30
}

fn default_cache_capacity_sessions() -> u64 {
    50
}

fn default_cache_ttl_sessions() -> u64 {
    60
}

fn default_cache_capacity_message_pages() -> u64 {
    100
}

fn default_cache_ttl_message_pages() -> u64 {
    30
}

fn default_cache_capacity_search() -> u64 {
    200
}

fn default_cache_ttl_search() -> u64 {
    120
}

fn default_cache_capacity_agent_memory() -> u64 {
    500
}

fn default_cache_ttl_agent_memory() -> u64 {
    300
}

impl ServerConfig {
    /// Loads from bare (unprefixed) environment variables: `DATABASE_URL`,
    /// `JWT_SECRET_KEY`, `JWT_ENCRYPTION_KEY`, `API_KEY`,
    /// `TOKEN_TTL_SECONDS`, `WS_HEARTBEAT_SECONDS`, the `CACHE_CAPACITY_*`
    /// / `CACHE_TTL_*` family, `LOG_LEVEL`, and `CI`.
    pub fn load() -> CoreResult<Self> {
        let source = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .map_err(|e| CoreError::internal(format!("failed to load configuration: {e}")))?;

        let config: Self = source
            .try_deserialize()
            .map_err(|e| CoreError::internal(format!("invalid configuration: {e}")))?;

        if config.jwt_secret_key.trim().is_empty() {
            return Err(CoreError::internal("JWT_SECRET_KEY is required and must not be empty"));
        }
        if config.jwt_encryption_key.trim().is_empty() {
            return Err(CoreError::internal("JWT_ENCRYPTION_KEY is required and must not be empty"));
        }
        Ok(config)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_seconds)
    }

    pub fn ws_heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.ws_heartbeat_seconds)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            sessions_capacity: self.cache_capacity_sessions,
            sessions_ttl: Duration::from_secs(self.cache_ttl_sessions),
            message_pages_capacity: self.cache_capacity_message_pages,
            message_pages_ttl: Duration::from_secs(self.cache_ttl_message_pages),
            search_capacity: self.cache_capacity_search,
            search_ttl: Duration::from_secs(self.cache_ttl_search),
            agent_memory_capacity: self.cache_capacity_agent_memory,
            agent_memory_ttl: Duration::from_secs(self.cache_ttl_agent_memory),
        }
    }

    pub fn decode_jwt_secret(&self) -> CoreResult<Vec<u8>> {
        decode_base64(&self.jwt_secret_key, "JWT_SECRET_KEY")
    }

    pub fn decode_aead_key(&self) -> CoreResult<Vec<u8>> {
        let bytes = decode_base64(&self.jwt_encryption_key, "JWT_ENCRYPTION_KEY")?;
        if bytes.len() != 32 {
            return Err(CoreError::internal("JWT_ENCRYPTION_KEY must decode to exactly 32 bytes"));
        }
        Ok(bytes)
    }
}

fn decode_base64(value: &str, var_name: &str) -> CoreResult<Vec<u8>> {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    BASE64
        .decode(value.trim())
        .map_err(|_| CoreError::internal(format!("{var_name} must be valid base64")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(jwt_secret_key: &str, jwt_encryption_key: &str) -> ServerConfig {
        ServerConfig {
            database_url: default_database_url(),
            bind_addr: default_bind_addr(),
            jwt_secret_key: jwt_secret_key.into(),
            jwt_encryption_key: jwt_encryption_key.into(),
            token_ttl_seconds: 1800,
            api_key: None,
            log_format: LogFormat::Pretty,
            log_level: default_log_level(),
            ws_heartbeat_seconds: default_ws_heartbeat_seconds(),
            cache_capacity_sessions: default_cache_capacity_sessions(),
            cache_ttl_sessions: default_cache_ttl_sessions(),
            cache_capacity_message_pages: default_cache_capacity_message_pages(),
            cache_ttl_message_pages: default_cache_ttl_message_pages(),
            cache_capacity_search: default_cache_capacity_search(),
            cache_ttl_search: default_cache_ttl_search(),
            cache_capacity_agent_memory: default_cache_capacity_agent_memory(),
            cache_ttl_agent_memory: default_cache_ttl_agent_memory(),
            ci: false,
        }
    }

    #[test]
    fn rejects_empty_jwt_secret() {
        // Env var based, but the boundary check itself is pure.
        let bad = base("", "x");
        assert!(bad.jwt_secret_key.trim().is_empty());
    }

    #[test]
    fn decodes_valid_base64_aead_key() {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine;
        let config = base("secret", &BASE64.encode([3u8; 32]));
        assert_eq!(config.decode_aead_key().unwrap().len(), 32);
    }
}
