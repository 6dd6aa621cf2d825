// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::AuthError;

/// One login session.  Both credential strings are stored only as SHA-256
/// hex digests.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: i64,
    pub uuid: String,
    pub user_id: i64,
    pub session_hash: String,
    pub refresh_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

const COLUMNS: &str = "id, uuid, user_id, session_hash, refresh_hash, expires_at, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        uuid: row.get(1)?,
        user_id: row.get(2)?,
        session_hash: row.get(3)?,
        refresh_hash: row.get(4)?,
        expires_at: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub(crate) fn insert(
    conn: &Connection,
    user_id: i64,
    session_hash: &str,
    refresh_hash: &str,
    expires_at: DateTime<Utc>,
) -> Result<SessionRecord, AuthError> {
    let uuid = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO ent_sessions (uuid, user_id, session_hash, refresh_hash, expires_at, \
         created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![uuid, user_id, session_hash, refresh_hash, expires_at, Utc::now()],
    )?;
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM ent_sessions WHERE id = ?1"),
        params![conn.last_insert_rowid()],
        from_row,
    )
    .map_err(AuthError::Storage)
}

pub(crate) fn get_by_refresh_hash(
    conn: &Connection,
    refresh_hash: &str,
) -> Result<Option<SessionRecord>, AuthError> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM ent_sessions WHERE refresh_hash = ?1"),
        params![refresh_hash],
        from_row,
    )
    .optional()
    .map_err(AuthError::Storage)
}

pub(crate) fn get_by_session_hash(
    conn: &Connection,
    session_hash: &str,
) -> Result<Option<SessionRecord>, AuthError> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM ent_sessions WHERE session_hash = ?1"),
        params![session_hash],
        from_row,
    )
    .optional()
    .map_err(AuthError::Storage)
}

pub(crate) fn update_session_hash(
    conn: &Connection,
    id: i64,
    session_hash: &str,
) -> Result<(), AuthError> {
    conn.execute(
        "UPDATE ent_sessions SET session_hash = ?1 WHERE id = ?2",
        params![session_hash, id],
    )?;
    Ok(())
}

pub(crate) fn delete_by_session_hash(
    conn: &Connection,
    session_hash: &str,
) -> Result<bool, AuthError> {
    let affected = conn.execute(
        "DELETE FROM ent_sessions WHERE session_hash = ?1",
        params![session_hash],
    )?;
    Ok(affected > 0)
}

pub(crate) fn delete_for_user(conn: &Connection, user_id: i64) -> Result<usize, AuthError> {
    let affected =
        conn.execute("DELETE FROM ent_sessions WHERE user_id = ?1", params![user_id])?;
    Ok(affected)
}

pub(crate) fn delete_expired(conn: &Connection, now: DateTime<Utc>) -> Result<usize, AuthError> {
    let affected =
        conn.execute("DELETE FROM ent_sessions WHERE expires_at < ?1", params![now])?;
    Ok(affected)
}

pub(crate) fn count_for_user(conn: &Connection, user_id: i64) -> Result<i64, AuthError> {
    conn.query_row(
        "SELECT COUNT(*) FROM ent_sessions WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )
    .map_err(AuthError::Storage)
}
