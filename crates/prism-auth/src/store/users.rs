// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::AuthError;
use crate::roles::Role;

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub uuid: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub full_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

pub(crate) struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
    pub full_name: &'a str,
}

const COLUMNS: &str = "id, uuid, username, email, password_hash, role, full_name, \
                       is_active, created_at, updated_at, last_login_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    let role_text: String = row.get(5)?;
    Ok(UserRecord {
        id: row.get(0)?,
        uuid: row.get(1)?,
        username: row.get(2)?,
        email: row.get(3)?,
        password_hash: row.get(4)?,
        role: Role::parse(&role_text).unwrap_or(Role::ReadOnly),
        full_name: row.get(6)?,
        is_active: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        last_login_at: row.get(10)?,
    })
}

pub(crate) fn insert(conn: &Connection, user: &NewUser<'_>) -> Result<UserRecord, AuthError> {
    let now = Utc::now();
    let uuid = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO ent_users (uuid, username, email, password_hash, role, full_name, \
         is_active, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8)",
        params![uuid, user.username, user.email, user.password_hash, user.role.as_str(), user.full_name, now, now],
    )
    .map_err(map_unique_violation)?;
    get_by_id(conn, conn.last_insert_rowid())?.ok_or(AuthError::NotFound("user"))
}

fn map_unique_violation(err: rusqlite::Error) -> AuthError {
    if let rusqlite::Error::SqliteFailure(e, Some(msg)) = &err {
        if e.code == rusqlite::ErrorCode::ConstraintViolation {
            if msg.contains("username") {
                return AuthError::AlreadyExists("username");
            }
            if msg.contains("email") {
                return AuthError::AlreadyExists("email");
            }
        }
    }
    AuthError::Storage(err)
}

pub(crate) fn get_by_id(conn: &Connection, id: i64) -> Result<Option<UserRecord>, AuthError> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM ent_users WHERE id = ?1"),
        params![id],
        from_row,
    )
    .optional()
    .map_err(AuthError::Storage)
}

pub(crate) fn get_by_uuid(conn: &Connection, uuid: &str) -> Result<Option<UserRecord>, AuthError> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM ent_users WHERE uuid = ?1"),
        params![uuid],
        from_row,
    )
    .optional()
    .map_err(AuthError::Storage)
}

pub(crate) fn get_by_username(
    conn: &Connection,
    username: &str,
) -> Result<Option<UserRecord>, AuthError> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM ent_users WHERE username = ?1"),
        params![username],
        from_row,
    )
    .optional()
    .map_err(AuthError::Storage)
}

/// Partial patch: only the provided fields change.
pub(crate) fn update(
    conn: &Connection,
    id: i64,
    full_name: Option<&str>,
    role: Option<Role>,
) -> Result<(), AuthError> {
    let now = Utc::now();
    if let Some(full_name) = full_name {
        conn.execute(
            "UPDATE ent_users SET full_name = ?1, updated_at = ?2 WHERE id = ?3",
            params![full_name, now, id],
        )?;
    }
    if let Some(role) = role {
        conn.execute(
            "UPDATE ent_users SET role = ?1, updated_at = ?2 WHERE id = ?3",
            params![role.as_str(), now, id],
        )?;
    }
    Ok(())
}

pub(crate) fn set_password_hash(
    conn: &Connection,
    id: i64,
    password_hash: &str,
) -> Result<(), AuthError> {
    conn.execute(
        "UPDATE ent_users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
        params![password_hash, Utc::now(), id],
    )?;
    Ok(())
}

pub(crate) fn set_active(conn: &Connection, id: i64, is_active: bool) -> Result<(), AuthError> {
    conn.execute(
        "UPDATE ent_users SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
        params![is_active, Utc::now(), id],
    )?;
    Ok(())
}

pub(crate) fn set_last_login(conn: &Connection, id: i64) -> Result<(), AuthError> {
    conn.execute(
        "UPDATE ent_users SET last_login_at = ?1 WHERE id = ?2",
        params![Utc::now(), id],
    )?;
    Ok(())
}

pub(crate) fn delete(conn: &Connection, id: i64) -> Result<bool, AuthError> {
    let affected = conn.execute("DELETE FROM ent_users WHERE id = ?1", params![id])?;
    Ok(affected > 0)
}

pub(crate) fn list(
    conn: &Connection,
    offset: i64,
    limit: i64,
) -> Result<(Vec<UserRecord>, i64), AuthError> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM ent_users", [], |row| row.get(0))?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM ent_users ORDER BY id LIMIT ?1 OFFSET ?2"
    ))?;
    let users = stmt
        .query_map(params![limit, offset], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok((users, total))
}

/// Dedicated count for the last-admin guard; never a page scan.
pub(crate) fn count_active_admins(conn: &Connection) -> Result<i64, AuthError> {
    conn.query_row(
        "SELECT COUNT(*) FROM ent_users WHERE role = 'admin' AND is_active = 1",
        [],
        |row| row.get(0),
    )
    .map_err(AuthError::Storage)
}
