// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failure,
}

impl AuditStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// One append-only audit row.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub id: i64,
    pub user_id: Option<i64>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub details: Option<serde_json::Value>,
    pub ip: String,
    pub user_agent: String,
    pub status: AuditStatus,
    pub created_at: DateTime<Utc>,
}

pub(crate) struct NewAuditEntry<'a> {
    pub user_id: Option<i64>,
    pub action: &'a str,
    pub resource_type: &'a str,
    pub resource_id: String,
    pub details: Option<serde_json::Value>,
    pub ip: String,
    pub user_agent: String,
    pub status: AuditStatus,
}

/// Read-side filters; every populated field narrows the page.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub user_id: Option<i64>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub status: Option<AuditStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

const COLUMNS: &str =
    "id, user_id, action, resource_type, resource_id, details, ip, user_agent, status, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<AuditRecord> {
    let details_text: Option<String> = row.get(5)?;
    let status_text: String = row.get(8)?;
    Ok(AuditRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        action: row.get(2)?,
        resource_type: row.get(3)?,
        resource_id: row.get(4)?,
        details: details_text.and_then(|t| serde_json::from_str(&t).ok()),
        ip: row.get(6)?,
        user_agent: row.get(7)?,
        status: if status_text == "failure" { AuditStatus::Failure } else { AuditStatus::Success },
        created_at: row.get(9)?,
    })
}

pub(crate) fn append(conn: &Connection, entry: &NewAuditEntry<'_>) -> Result<i64, AuthError> {
    let details_text = entry
        .details
        .as_ref()
        .and_then(|d| serde_json::to_string(d).ok());
    conn.execute(
        "INSERT INTO ent_audit_logs (user_id, action, resource_type, resource_id, details, \
         ip, user_agent, status, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            entry.user_id,
            entry.action,
            entry.resource_type,
            entry.resource_id,
            details_text,
            entry.ip,
            entry.user_agent,
            entry.status.as_str(),
            Utc::now()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Every filter is optional: a NULL parameter disables its clause, so one
/// prepared statement serves all filter combinations.
const LIST_WHERE: &str = "WHERE (?1 IS NULL OR user_id = ?1) \
                          AND (?2 IS NULL OR action = ?2) \
                          AND (?3 IS NULL OR resource_type = ?3) \
                          AND (?4 IS NULL OR status = ?4) \
                          AND (?5 IS NULL OR created_at >= ?5) \
                          AND (?6 IS NULL OR created_at <= ?6)";

pub(crate) fn list(
    conn: &Connection,
    filter: &AuditFilter,
    offset: i64,
    limit: i64,
) -> Result<(Vec<AuditRecord>, i64), AuthError> {
    let status = filter.status.map(|s| s.as_str());

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM ent_audit_logs {LIST_WHERE}"),
        params![
            filter.user_id,
            filter.action,
            filter.resource_type,
            status,
            filter.from,
            filter.to
        ],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM ent_audit_logs {LIST_WHERE} \
         ORDER BY id DESC LIMIT ?7 OFFSET ?8"
    ))?;
    let rows = stmt
        .query_map(
            params![
                filter.user_id,
                filter.action,
                filter.resource_type,
                status,
                filter.from,
                filter.to,
                limit,
                offset
            ],
            from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok((rows, total))
}

/// Retention sweep: remove rows older than `cutoff`.
pub(crate) fn delete_older_than(
    conn: &Connection,
    cutoff: DateTime<Utc>,
) -> Result<usize, AuthError> {
    let affected = conn.execute(
        "DELETE FROM ent_audit_logs WHERE created_at < ?1",
        rusqlite::params![cutoff],
    )?;
    Ok(affected)
}
