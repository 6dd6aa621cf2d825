// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Audit trail plumbing.
//!
//! Writes are a best-effort side effect of the mutating operation that
//! triggered them, issued inside the same lock scope so entries for one
//! actor within one request stay in causal order.  A failed audit write is
//! logged and never fails the operation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::warn;

use crate::error::AuthError;
use crate::store::{audit_repo, AuditFilter, AuditRecord, AuditStatus, Store};

pub(crate) use crate::store::audit_repo::NewAuditEntry;

/// Client attribution carried into every audit row.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip: String,
    pub user_agent: String,
}

impl RequestContext {
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self { ip: ip.into(), user_agent: user_agent.into() }
    }
}

/// Append an audit row, logging (never propagating) failures.
pub(crate) fn record(conn: &Connection, entry: NewAuditEntry<'_>) {
    if let Err(e) = audit_repo::append(conn, &entry) {
        warn!(action = entry.action, error = %e, "audit write failed");
    }
}

pub(crate) fn entry<'a>(
    user_id: Option<i64>,
    action: &'a str,
    resource_type: &'a str,
    resource_id: String,
    ctx: &RequestContext,
    status: AuditStatus,
) -> NewAuditEntry<'a> {
    NewAuditEntry {
        user_id,
        action,
        resource_type,
        resource_id,
        details: None,
        ip: ctx.ip.clone(),
        user_agent: ctx.user_agent.clone(),
        status,
    }
}

/// Read-side audit API: filtered pagination and retention.
pub struct AuditService {
    store: Arc<Store>,
}

impl AuditService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn list(
        &self,
        filter: &AuditFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<AuditRecord>, i64), AuthError> {
        let conn = self.store.lock().await;
        audit_repo::list(&conn, filter, offset, limit.clamp(1, 1000))
    }

    /// Retention sweep; returns the number of rows removed.
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, AuthError> {
        let conn = self.store.lock().await;
        audit_repo::delete_older_than(&conn, cutoff)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
