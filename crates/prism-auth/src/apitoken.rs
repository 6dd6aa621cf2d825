// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Opaque API tokens.
//!
//! A raw token is `ent-` followed by a v4 UUID and is shown to its creator
//! exactly once; only the SHA-256 digest is stored.  Lookup is by digest —
//! the stored prefix exists for human identification only.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::warn;
use uuid::Uuid;

use crate::audit::{self, RequestContext};
use crate::error::AuthError;
use crate::roles::{Role, Scope};
use crate::store::{token_repo, ApiTokenRecord, AuditStatus, Store, UserRecord};

pub const TOKEN_PREFIX: &str = "ent-";
/// Stored identification prefix length (first 8 chars of the raw token).
const ID_PREFIX_LEN: usize = 8;

pub(crate) fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

impl ApiTokenRecord {
    /// True iff the token grants `scope` directly or through `admin:all`.
    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope) || self.scopes.contains(&Scope::AdminAll)
    }

    pub fn has_any_scope(&self, scopes: &[Scope]) -> bool {
        scopes.iter().any(|s| self.has_scope(*s))
    }
}

#[derive(Debug, Clone)]
pub struct NewTokenRequest {
    pub name: String,
    pub scopes: Vec<Scope>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Partial patch for token updates; `expires_at: Some(None)` clears expiry.
#[derive(Debug, Clone, Default)]
pub struct TokenPatch {
    pub name: Option<String>,
    pub scopes: Option<Vec<Scope>>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

pub struct ApiTokenService {
    store: Arc<Store>,
}

impl ApiTokenService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Create a token owned by `owner_id`.  Returns the record and the raw
    /// token — the only time the raw value is ever visible.
    pub async fn create(
        &self,
        actor: &UserRecord,
        owner_id: i64,
        request: NewTokenRequest,
        ctx: &RequestContext,
    ) -> Result<(ApiTokenRecord, String), AuthError> {
        if actor.role != Role::Admin && actor.id != owner_id {
            return Err(AuthError::Forbidden);
        }
        if request.name.trim().is_empty() {
            return Err(AuthError::InvalidInput("token name must not be empty".into()));
        }

        let raw = format!("{TOKEN_PREFIX}{}", Uuid::new_v4());
        let token_hash = sha256_hex(&raw);
        let prefix = &raw[..ID_PREFIX_LEN];

        let conn = self.store.lock().await;
        let record = token_repo::insert(
            &conn,
            &token_repo::NewApiToken {
                user_id: owner_id,
                token_hash: &token_hash,
                prefix,
                name: request.name.trim(),
                scopes: &request.scopes,
                expires_at: request.expires_at,
            },
        )?;
        audit::record(
            &conn,
            audit::entry(
                Some(actor.id),
                "token.create",
                "api_token",
                record.uuid.clone(),
                ctx,
                AuditStatus::Success,
            ),
        );
        Ok((record, raw))
    }

    /// Validate a presented bearer: digest lookup, then activity and expiry.
    pub async fn validate(&self, raw: &str) -> Result<ApiTokenRecord, AuthError> {
        let token_hash = sha256_hex(raw);
        let conn = self.store.lock().await;
        let token = token_repo::get_by_hash(&conn, &token_hash)?
            .ok_or_else(|| AuthError::TokenInvalid("unknown token".into()))?;
        // The indexed lookup only selects the candidate row; acceptance is
        // decided by a constant-time comparison of the digests.
        if !bool::from(token_hash.as_bytes().ct_eq(token.token_hash.as_bytes())) {
            return Err(AuthError::TokenInvalid("unknown token".into()));
        }
        if !token.is_active {
            return Err(AuthError::TokenInactive);
        }
        if let Some(expires_at) = token.expires_at {
            if expires_at <= Utc::now() {
                return Err(AuthError::TokenExpired);
            }
        }
        Ok(token)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<ApiTokenRecord, AuthError> {
        let conn = self.store.lock().await;
        token_repo::get_by_id(&conn, id)?.ok_or(AuthError::NotFound("api token"))
    }

    pub async fn list_for_user(
        &self,
        actor: &UserRecord,
        user_id: i64,
    ) -> Result<Vec<ApiTokenRecord>, AuthError> {
        if actor.role != Role::Admin && actor.id != user_id {
            return Err(AuthError::Forbidden);
        }
        let conn = self.store.lock().await;
        token_repo::list_for_user(&conn, user_id)
    }

    /// Update name, scopes, or expiry.
    pub async fn update(
        &self,
        actor: &UserRecord,
        id: i64,
        patch: TokenPatch,
        ctx: &RequestContext,
    ) -> Result<ApiTokenRecord, AuthError> {
        let conn = self.store.lock().await;
        let token = Self::owned(&conn, actor, id)?;
        token_repo::update(
            &conn,
            token.id,
            patch.name.as_deref(),
            patch.scopes.as_deref(),
            patch.expires_at,
        )?;
        audit::record(
            &conn,
            audit::entry(
                Some(actor.id),
                "token.update",
                "api_token",
                token.uuid.clone(),
                ctx,
                AuditStatus::Success,
            ),
        );
        token_repo::get_by_id(&conn, token.id)?.ok_or(AuthError::NotFound("api token"))
    }

    pub async fn deactivate(
        &self,
        actor: &UserRecord,
        id: i64,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        self.set_active(actor, id, false, ctx).await
    }

    pub async fn activate(
        &self,
        actor: &UserRecord,
        id: i64,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        self.set_active(actor, id, true, ctx).await
    }

    async fn set_active(
        &self,
        actor: &UserRecord,
        id: i64,
        is_active: bool,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        let conn = self.store.lock().await;
        let token = Self::owned(&conn, actor, id)?;
        token_repo::set_active(&conn, token.id, is_active)?;
        audit::record(
            &conn,
            audit::entry(
                Some(actor.id),
                "token.update",
                "api_token",
                token.uuid.clone(),
                ctx,
                AuditStatus::Success,
            ),
        );
        Ok(())
    }

    pub async fn delete_by_id(
        &self,
        actor: &UserRecord,
        id: i64,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        let conn = self.store.lock().await;
        let token = Self::owned(&conn, actor, id)?;
        token_repo::delete_by_id(&conn, token.id)?;
        audit::record(
            &conn,
            audit::entry(
                Some(actor.id),
                "token.delete",
                "api_token",
                token.uuid.clone(),
                ctx,
                AuditStatus::Success,
            ),
        );
        Ok(())
    }

    pub async fn delete_by_uuid(
        &self,
        actor: &UserRecord,
        uuid: &str,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        let conn = self.store.lock().await;
        let token =
            token_repo::get_by_uuid(&conn, uuid)?.ok_or(AuthError::NotFound("api token"))?;
        if actor.role != Role::Admin && token.user_id != actor.id {
            return Err(AuthError::Forbidden);
        }
        token_repo::delete_by_uuid(&conn, uuid)?;
        audit::record(
            &conn,
            audit::entry(
                Some(actor.id),
                "token.delete",
                "api_token",
                uuid.to_string(),
                ctx,
                AuditStatus::Success,
            ),
        );
        Ok(())
    }

    /// Update `last_used_at`; failures are logged only, so usage recording
    /// can run detached from the request path.
    pub async fn record_usage(&self, id: i64) {
        let conn = self.store.lock().await;
        if let Err(e) = token_repo::touch_last_used(&conn, id) {
            warn!(token_id = id, error = %e, "failed to record token usage");
        }
    }

    /// Delete every expired token; returns the number removed.
    pub async fn cleanup_expired(&self) -> Result<usize, AuthError> {
        let conn = self.store.lock().await;
        token_repo::delete_expired(&conn, Utc::now())
    }

    fn owned(
        conn: &rusqlite::Connection,
        actor: &UserRecord,
        id: i64,
    ) -> Result<ApiTokenRecord, AuthError> {
        let token = token_repo::get_by_id(conn, id)?.ok_or(AuthError::NotFound("api token"))?;
        if actor.role != Role::Admin && token.user_id != actor.id {
            return Err(AuthError::Forbidden);
        }
        Ok(token)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
