// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::AuthError;
use crate::roles::Scope;

#[derive(Debug, Clone)]
pub struct ApiTokenRecord {
    pub id: i64,
    pub uuid: String,
    pub user_id: i64,
    pub token_hash: String,
    /// First 8 characters of the raw token, for human identification only —
    /// never used for lookup.
    pub prefix: String,
    pub name: String,
    pub scopes: Vec<Scope>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

pub(crate) struct NewApiToken<'a> {
    pub user_id: i64,
    pub token_hash: &'a str,
    pub prefix: &'a str,
    pub name: &'a str,
    pub scopes: &'a [Scope],
    pub expires_at: Option<DateTime<Utc>>,
}

const COLUMNS: &str = "id, uuid, user_id, token_hash, prefix, name, scopes, \
                       expires_at, last_used_at, is_active, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<ApiTokenRecord> {
    let scopes_text: String = row.get(6)?;
    Ok(ApiTokenRecord {
        id: row.get(0)?,
        uuid: row.get(1)?,
        user_id: row.get(2)?,
        token_hash: row.get(3)?,
        prefix: row.get(4)?,
        name: row.get(5)?,
        scopes: decode_scopes(&scopes_text),
        expires_at: row.get(7)?,
        last_used_at: row.get(8)?,
        is_active: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn encode_scopes(scopes: &[Scope]) -> String {
    serde_json::to_string(scopes).unwrap_or_else(|_| "[]".into())
}

fn decode_scopes(text: &str) -> Vec<Scope> {
    serde_json::from_str(text).unwrap_or_default()
}

pub(crate) fn insert(
    conn: &Connection,
    token: &NewApiToken<'_>,
) -> Result<ApiTokenRecord, AuthError> {
    let uuid = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO ent_api_tokens (uuid, user_id, token_hash, prefix, name, scopes, \
         expires_at, is_active, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)",
        params![
            uuid,
            token.user_id,
            token.token_hash,
            token.prefix,
            token.name,
            encode_scopes(token.scopes),
            token.expires_at,
            Utc::now()
        ],
    )?;
    get_by_id(conn, conn.last_insert_rowid())?.ok_or(AuthError::NotFound("api token"))
}

pub(crate) fn get_by_id(conn: &Connection, id: i64) -> Result<Option<ApiTokenRecord>, AuthError> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM ent_api_tokens WHERE id = ?1"),
        params![id],
        from_row,
    )
    .optional()
    .map_err(AuthError::Storage)
}

pub(crate) fn get_by_uuid(
    conn: &Connection,
    uuid: &str,
) -> Result<Option<ApiTokenRecord>, AuthError> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM ent_api_tokens WHERE uuid = ?1"),
        params![uuid],
        from_row,
    )
    .optional()
    .map_err(AuthError::Storage)
}

/// Primary lookup path: by SHA-256 digest of the presented bearer.
pub(crate) fn get_by_hash(
    conn: &Connection,
    token_hash: &str,
) -> Result<Option<ApiTokenRecord>, AuthError> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM ent_api_tokens WHERE token_hash = ?1"),
        params![token_hash],
        from_row,
    )
    .optional()
    .map_err(AuthError::Storage)
}

pub(crate) fn list_for_user(
    conn: &Connection,
    user_id: i64,
) -> Result<Vec<ApiTokenRecord>, AuthError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM ent_api_tokens WHERE user_id = ?1 ORDER BY id"
    ))?;
    let tokens = stmt
        .query_map(params![user_id], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tokens)
}

/// Partial patch of name, scopes, expiry.
pub(crate) fn update(
    conn: &Connection,
    id: i64,
    name: Option<&str>,
    scopes: Option<&[Scope]>,
    expires_at: Option<Option<DateTime<Utc>>>,
) -> Result<(), AuthError> {
    if let Some(name) = name {
        conn.execute("UPDATE ent_api_tokens SET name = ?1 WHERE id = ?2", params![name, id])?;
    }
    if let Some(scopes) = scopes {
        conn.execute(
            "UPDATE ent_api_tokens SET scopes = ?1 WHERE id = ?2",
            params![encode_scopes(scopes), id],
        )?;
    }
    if let Some(expires_at) = expires_at {
        conn.execute(
            "UPDATE ent_api_tokens SET expires_at = ?1 WHERE id = ?2",
            params![expires_at, id],
        )?;
    }
    Ok(())
}

pub(crate) fn set_active(conn: &Connection, id: i64, is_active: bool) -> Result<(), AuthError> {
    conn.execute(
        "UPDATE ent_api_tokens SET is_active = ?1 WHERE id = ?2",
        params![is_active, id],
    )?;
    Ok(())
}

pub(crate) fn touch_last_used(conn: &Connection, id: i64) -> Result<(), AuthError> {
    conn.execute(
        "UPDATE ent_api_tokens SET last_used_at = ?1 WHERE id = ?2",
        params![Utc::now(), id],
    )?;
    Ok(())
}

pub(crate) fn delete_by_id(conn: &Connection, id: i64) -> Result<bool, AuthError> {
    let affected = conn.execute("DELETE FROM ent_api_tokens WHERE id = ?1", params![id])?;
    Ok(affected > 0)
}

pub(crate) fn delete_by_uuid(conn: &Connection, uuid: &str) -> Result<bool, AuthError> {
    let affected = conn.execute("DELETE FROM ent_api_tokens WHERE uuid = ?1", params![uuid])?;
    Ok(affected > 0)
}

/// Delete every token whose expiry has passed.  Returns the number removed.
pub(crate) fn delete_expired(conn: &Connection, now: DateTime<Utc>) -> Result<usize, AuthError> {
    let affected = conn.execute(
        "DELETE FROM ent_api_tokens WHERE expires_at IS NOT NULL AND expires_at < ?1",
        params![now],
    )?;
    Ok(affected)
}
