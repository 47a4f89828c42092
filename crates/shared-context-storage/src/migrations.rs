//! Forward-only schema migrations, applied idempotently on connect. SQLite
//! and Postgres get separate DDL
//! because column types and autoincrement syntax differ; the logical schema
//! (table/column names) is identical so engine-level queries stay portable.

pub const SQLITE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id          TEXT PRIMARY KEY,
    purpose     TEXT NOT NULL,
    created_by  TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    is_active   INTEGER NOT NULL DEFAULT 1,
    metadata    TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS messages (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id         TEXT NOT NULL REFERENCES sessions(id),
    sender             TEXT NOT NULL,
    content            TEXT NOT NULL,
    visibility         TEXT NOT NULL,
    message_type       TEXT NOT NULL,
    metadata           TEXT NOT NULL DEFAULT '{}',
    timestamp          TEXT NOT NULL,
    parent_message_id  INTEGER
);
CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, timestamp, id);

-- session_id is NOT NULL with '' standing in for global (session-less) scope:
-- composite PRIMARY KEYs never treat two NULLs as equal in SQLite, and
-- Postgres forbids NULL in PRIMARY KEY columns outright, so global memory
-- needs a real sentinel to upsert correctly under either driver.
CREATE TABLE IF NOT EXISTS agent_memory (
    agent_id    TEXT NOT NULL,
    session_id  TEXT NOT NULL DEFAULT '',
    key         TEXT NOT NULL,
    value       TEXT NOT NULL,
    metadata    TEXT NOT NULL DEFAULT '{}',
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    expires_at  TEXT,
    PRIMARY KEY (agent_id, session_id, key)
);

CREATE TABLE IF NOT EXISTS secure_tokens (
    token_id      TEXT PRIMARY KEY,
    encrypted_jwt BLOB NOT NULL,
    nonce         BLOB NOT NULL,
    agent_id      TEXT NOT NULL,
    expires_at    TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_log (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp   TEXT NOT NULL,
    event_type  TEXT NOT NULL,
    agent_id    TEXT NOT NULL,
    session_id  TEXT,
    resource    TEXT,
    action      TEXT,
    result      TEXT NOT NULL,
    metadata    TEXT NOT NULL DEFAULT '{}'
);
"#;

#[cfg(feature = "postgres")]
pub const POSTGRES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id          TEXT PRIMARY KEY,
    purpose     TEXT NOT NULL,
    created_by  TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    is_active   BOOLEAN NOT NULL DEFAULT TRUE,
    metadata    TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS messages (
    id                 BIGSERIAL PRIMARY KEY,
    session_id         TEXT NOT NULL REFERENCES sessions(id),
    sender             TEXT NOT NULL,
    content            TEXT NOT NULL,
    visibility         TEXT NOT NULL,
    message_type       TEXT NOT NULL,
    metadata           TEXT NOT NULL DEFAULT '{}',
    timestamp          TEXT NOT NULL,
    parent_message_id  BIGINT
);
CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, timestamp, id);

-- session_id is NOT NULL with '' standing in for global (session-less) scope:
-- composite PRIMARY KEYs never treat two NULLs as equal in SQLite, and
-- Postgres forbids NULL in PRIMARY KEY columns outright, so global memory
-- needs a real sentinel to upsert correctly under either driver.
CREATE TABLE IF NOT EXISTS agent_memory (
    agent_id    TEXT NOT NULL,
    session_id  TEXT NOT NULL DEFAULT '',
    key         TEXT NOT NULL,
    value       TEXT NOT NULL,
    metadata    TEXT NOT NULL DEFAULT '{}',
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    expires_at  TEXT,
    PRIMARY KEY (agent_id, session_id, key)
);

CREATE TABLE IF NOT EXISTS secure_tokens (
    token_id      TEXT PRIMARY KEY,
    encrypted_jwt BYTEA NOT NULL,
    nonce         BYTEA NOT NULL,
    agent_id      TEXT NOT NULL,
    expires_at    TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_log (
    id          BIGSERIAL PRIMARY KEY,
    timestamp   TEXT NOT NULL,
    event_type  TEXT NOT NULL,
    agent_id    TEXT NOT NULL,
    session_id  TEXT,
    resource    TEXT,
    action      TEXT,
    result      TEXT NOT NULL,
    metadata    TEXT NOT NULL DEFAULT '{}'
);
"#;

pub const CURRENT_SCHEMA_VERSION: i64 = 1;
