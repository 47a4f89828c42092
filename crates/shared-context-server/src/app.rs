//! Process bootstrap: config -> secrets -> storage -> hub -> engines,
//! torn down in reverse. `App` is the process-wide state handed to every
//! transport.

use std::sync::Arc;

use shared_context_auth::TokenStore;
use shared_context_core::{AuditLog, Cache, MemoryEngine, MessageEngine, NotificationHub, SearchEngine, SessionEngine};
use shared_context_protocol::{CoreResult, Permission};
use shared_context_storage::Storage;
use tracing::info;

use crate::config::ServerConfig;

pub struct App {
    pub config: ServerConfig,
    pub storage: Arc<dyn Storage>,
    pub tokens: Arc<TokenStore>,
    pub hub: NotificationHub,
    pub sessions: Arc<SessionEngine>,
    pub messages: Arc<MessageEngine>,
    pub memory: Arc<MemoryEngine>,
    pub search: Arc<SearchEngine>,
    pub audit: Arc<AuditLog>,
    pub cache: Arc<Cache>,
    sweepers: Vec<tokio::task::JoinHandle<()>>,
}

impl App {
    pub async fn bootstrap(config: ServerConfig) -> CoreResult<Self> {
        let signing_key = config.decode_jwt_secret()?;
        let aead_key = config.decode_aead_key()?;

        let storage = shared_context_storage::connect(&config.database_url, config.ci).await?;
        info!(database_url = %config.database_url, "storage connected and migrated");

        let hub = NotificationHub::new();
        let cache = Arc::new(Cache::with_config(config.cache_config()));
        let audit = Arc::new(AuditLog::new(storage.clone()));

        let tokens = Arc::new(TokenStore::new(storage.clone(), signing_key, &aead_key, config.token_ttl())?);

        let sessions = Arc::new(SessionEngine::new(storage.clone(), cache.clone(), audit.clone()));
        let messages = Arc::new(MessageEngine::new(storage.clone(), cache.clone(), audit.clone(), hub.clone(), sessions.clone()));
        let memory = Arc::new(MemoryEngine::new(storage.clone(), cache.clone(), audit.clone()));
        let search = Arc::new(SearchEngine::new(storage.clone(), cache.clone()));

        if config.api_key.is_some() && !tokens.any_tokens_exist().await? {
            issue_bootstrap_admin(&tokens).await?;
        }

        let mut sweepers = Vec::new();
        sweepers.push(tokens.clone().spawn_sweeper());
        sweepers.push(memory.clone().spawn_sweeper());
        sweepers.push(hub.clone().spawn_heartbeat(config.ws_heartbeat_interval()));

        Ok(Self {
            config,
            storage,
            tokens,
            hub,
            sessions,
            messages,
            memory,
            search,
            audit,
            cache,
            sweepers,
        })
    }

    /// Reverse-order teardown: background tasks first, leaving engines and
    /// the storage pool to drop last with the `Arc`s that hold them.
    pub fn shutdown(self) {
        for handle in self.sweepers {
            handle.abort();
        }
    }
}

/// Mints the first admin token when the store is empty, so an operator has
/// a way in before any agent has authenticated. Printed once, at startup
/// only; never logged again.
async fn issue_bootstrap_admin(tokens: &TokenStore) -> CoreResult<()> {
    let permissions = std::collections::HashSet::from([Permission::Admin]);
    let issued = tokens.issue("bootstrap-admin", "admin", permissions, None).await?;
    eprintln!("bootstrap admin token (store securely, shown once): {}", issued.plaintext_token);
    Ok(())
}
