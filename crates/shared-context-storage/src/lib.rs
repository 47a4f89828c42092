//! Storage Backend: a single `Storage` contract with an embedded
//! SQLite driver (default) and an optional Postgres driver, selected at
//! connect time from the DSN scheme.

pub mod driver;
pub mod migrations;
pub mod retry;
pub mod sqlite;
pub mod time;

#[cfg(feature = "postgres")]
pub mod postgres;

use std::sync::Arc;

pub use driver::{MessagePage, NewMessage, Storage};
pub use retry::{retry_busy, RetryPolicy, RetryingStorage};

use shared_context_protocol::{CoreError, CoreResult};

/// Opens the driver matching the DSN scheme, runs its migrations, and wraps
/// it so `StorageBusy` errors retry with jittered backoff before reaching
/// callers. `ci` selects the shorter-attempt policy tuned for CI runs.
pub async fn connect(dsn: &str, ci: bool) -> CoreResult<Arc<dyn Storage>> {
    let policy = if ci { RetryPolicy::for_ci() } else { RetryPolicy::default() };

    if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
        #[cfg(feature = "postgres")]
        {
            let store = postgres::PostgresStorage::connect(dsn).await?;
            store.migrate().await?;
            return Ok(Arc::new(RetryingStorage::new(store, policy)));
        }
        #[cfg(not(feature = "postgres"))]
        {
            return Err(CoreError::storage_unavailable(
                "postgres DSN given but this build was not compiled with the postgres feature",
            ));
        }
    }

    let store = sqlite::SqliteStorage::connect(dsn).await?;
    store.migrate().await?;
    Ok(Arc::new(RetryingStorage::new(store, policy)))
}
