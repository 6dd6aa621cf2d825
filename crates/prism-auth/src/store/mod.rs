// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! SQLite-backed persistence for the identity core.
//!
//! One database file lives beneath a 0700 base directory.  Access goes
//! through a single connection behind an async mutex (single-writer
//! discipline); multi-step mutations run inside transactions on that
//! connection.  Repository functions are synchronous and take the guarded
//! connection, so services compose them freely under one lock scope.

pub(crate) mod audit;
pub(crate) mod sessions;
pub(crate) mod tokens;
pub(crate) mod users;

pub use audit::{AuditFilter, AuditRecord, AuditStatus};
pub use sessions::SessionRecord;
pub use tokens::ApiTokenRecord;
pub use users::UserRecord;

pub(crate) use audit as audit_repo;
pub(crate) use sessions as session_repo;
pub(crate) use tokens as token_repo;
pub(crate) use users as user_repo;

use std::path::Path;

use rusqlite::Connection;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::AuthError;

const DB_FILE: &str = "prism.db";

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if needed) the store beneath `base_dir`.
    ///
    /// The directory is created with mode 0700; the schema is applied on
    /// first open and a `system.init` audit row marks store creation.
    pub fn open(base_dir: &Path) -> Result<Self, AuthError> {
        create_private_dir(base_dir)?;
        let path = base_dir.join(DB_FILE);
        debug!(path = %path.display(), "opening identity store");
        let conn = Connection::open(&path)?;
        Self::from_connection(conn)
    }

    /// In-memory store, used by tests and ephemeral deployments.
    pub fn open_in_memory() -> Result<Self, AuthError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, AuthError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;

        let version: i64 =
            conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version == 0 {
            conn.execute_batch(SCHEMA)?;
            audit::append(
                &conn,
                &audit::NewAuditEntry {
                    user_id: None,
                    action: "system.init",
                    resource_type: "system",
                    resource_id: String::new(),
                    details: None,
                    ip: String::new(),
                    user_agent: String::new(),
                    status: AuditStatus::Success,
                },
            )?;
            conn.pragma_update(None, "user_version", 1)?;
            info!("identity store initialized");
        }
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Acquire the connection.  Hold the guard across every repository call
    /// belonging to one logical operation.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

/// Create `dir` with permissions 0700 (owner-only) on Unix.
fn create_private_dir(dir: &Path) -> Result<(), AuthError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(dir)
            .map_err(|e| AuthError::Config(format!("creating {}: {e}", dir.display())))?;
    }
    #[cfg(not(unix))]
    {
        std::fs::create_dir_all(dir)
            .map_err(|e| AuthError::Config(format!("creating {}: {e}", dir.display())))?;
    }
    Ok(())
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ent_users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid          TEXT NOT NULL UNIQUE,
    username      TEXT NOT NULL UNIQUE,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role          TEXT NOT NULL,
    full_name     TEXT NOT NULL DEFAULT '',
    is_active     INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    last_login_at TEXT
);

CREATE TABLE IF NOT EXISTS ent_api_tokens (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid         TEXT NOT NULL UNIQUE,
    user_id      INTEGER NOT NULL REFERENCES ent_users(id) ON DELETE CASCADE,
    token_hash   TEXT NOT NULL UNIQUE,
    prefix       TEXT NOT NULL,
    name         TEXT NOT NULL,
    scopes       TEXT NOT NULL DEFAULT '[]',
    expires_at   TEXT,
    last_used_at TEXT,
    is_active    INTEGER NOT NULL DEFAULT 1,
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_api_tokens_user_id    ON ent_api_tokens(user_id);
CREATE INDEX IF NOT EXISTS idx_api_tokens_expires_at ON ent_api_tokens(expires_at);

CREATE TABLE IF NOT EXISTS ent_sessions (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid         TEXT NOT NULL UNIQUE,
    user_id      INTEGER NOT NULL REFERENCES ent_users(id) ON DELETE CASCADE,
    session_hash TEXT NOT NULL UNIQUE,
    refresh_hash TEXT NOT NULL UNIQUE,
    expires_at   TEXT NOT NULL,
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_user_id    ON ent_sessions(user_id);
CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON ent_sessions(expires_at);

CREATE TABLE IF NOT EXISTS ent_audit_logs (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       INTEGER REFERENCES ent_users(id) ON DELETE SET NULL,
    action        TEXT NOT NULL,
    resource_type TEXT NOT NULL,
    resource_id   TEXT NOT NULL DEFAULT '',
    details       TEXT,
    ip            TEXT NOT NULL DEFAULT '',
    user_agent    TEXT NOT NULL DEFAULT '',
    status        TEXT NOT NULL,
    created_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_logs_user_id    ON ent_audit_logs(user_id);
CREATE INDEX IF NOT EXISTS idx_audit_logs_created_at ON ent_audit_logs(created_at);
CREATE INDEX IF NOT EXISTS idx_audit_logs_action     ON ent_audit_logs(action);
"#;

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_creates_db_file_and_init_audit_row() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("identity");
        let store = Store::open(&base).unwrap();
        assert!(base.join(DB_FILE).exists());

        let conn = store.lock().await;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM ent_audit_logs WHERE action = 'system.init'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn reopen_does_not_reinitialize() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("identity");
        drop(Store::open(&base).unwrap());
        let store = Store::open(&base).unwrap();
        let conn = store.lock().await;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM ent_audit_logs WHERE action = 'system.init'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1, "second open must not add another init row");
    }

    #[cfg(unix)]
    #[test]
    fn base_dir_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("identity");
        let _ = Store::open(&base).unwrap();
        let mode = std::fs::metadata(&base).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
