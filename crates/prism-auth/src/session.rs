// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Login sessions.
//!
//! A successful login issues a credential pair and stores only the SHA-256
//! digests of both strings.  Login failures disclose nothing beyond
//! "invalid credentials" but still leave a `user.login_failure` audit row.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::apitoken::sha256_hex;
use crate::audit::{self, RequestContext};
use crate::credential::{CredentialPair, CredentialService};
use crate::error::AuthError;
use crate::password::PasswordService;
use crate::store::{session_repo, user_repo, AuditStatus, SessionRecord, Store, UserRecord};

/// Everything a successful login yields.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: UserRecord,
    pub pair: CredentialPair,
    pub session: SessionRecord,
}

pub struct SessionService {
    store: Arc<Store>,
    credentials: Arc<CredentialService>,
    password: PasswordService,
}

impl SessionService {
    pub fn new(
        store: Arc<Store>,
        credentials: Arc<CredentialService>,
        password: PasswordService,
    ) -> Self {
        Self { store, credentials, password }
    }

    /// Authenticate `username`/`password` and open a session.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<LoginOutcome, AuthError> {
        let conn = self.store.lock().await;

        let Some(user) = user_repo::get_by_username(&conn, username)? else {
            audit::record(
                &conn,
                audit::entry(
                    None,
                    "user.login_failure",
                    "user",
                    username.to_string(),
                    ctx,
                    AuditStatus::Failure,
                ),
            );
            return Err(AuthError::InvalidCredentials);
        };

        if !self.password.verify(password, &user.password_hash)? {
            audit::record(
                &conn,
                audit::entry(
                    Some(user.id),
                    "user.login_failure",
                    "user",
                    user.uuid.clone(),
                    ctx,
                    AuditStatus::Failure,
                ),
            );
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active {
            audit::record(
                &conn,
                audit::entry(
                    Some(user.id),
                    "user.login_failure",
                    "user",
                    user.uuid.clone(),
                    ctx,
                    AuditStatus::Failure,
                ),
            );
            return Err(AuthError::UserInactive);
        }

        let pair = self.credentials.issue_pair(&user)?;
        let session = session_repo::insert(
            &conn,
            user.id,
            &sha256_hex(&pair.access),
            &sha256_hex(&pair.refresh),
            pair.refresh_expires_at,
        )?;
        user_repo::set_last_login(&conn, user.id)?;
        audit::record(
            &conn,
            audit::entry(
                Some(user.id),
                "user.login",
                "user",
                user.uuid.clone(),
                ctx,
                AuditStatus::Success,
            ),
        );
        info!(username = %user.username, "login succeeded");

        // Re-read so the caller sees last_login_at.
        let user = user_repo::get_by_id(&conn, user.id)?.ok_or(AuthError::NotFound("user"))?;
        Ok(LoginOutcome { user, pair, session })
    }

    /// Exchange a valid refresh credential for a fresh access credential.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, AuthError> {
        let claims = self.credentials.validate_refresh(refresh_token)?;
        let conn = self.store.lock().await;

        let session = session_repo::get_by_refresh_hash(&conn, &sha256_hex(refresh_token))?
            .ok_or(AuthError::SessionExpired)?;
        if session.expires_at <= Utc::now() {
            session_repo::delete_by_session_hash(&conn, &session.session_hash)?;
            return Err(AuthError::SessionExpired);
        }

        let user = user_repo::get_by_id(&conn, claims.user_id)?
            .ok_or(AuthError::InvalidCredentials)?;
        let (access, _expires_at) = self.credentials.refresh_access(refresh_token, &user)?;
        session_repo::update_session_hash(&conn, session.id, &sha256_hex(&access))?;
        debug!(username = %user.username, "access credential refreshed");
        Ok(access)
    }

    /// Close the session bound to `access_token`.
    pub async fn logout(&self, access_token: &str, ctx: &RequestContext) -> Result<(), AuthError> {
        let claims = self.credentials.validate_access(access_token)?;
        let conn = self.store.lock().await;
        let removed = session_repo::delete_by_session_hash(&conn, &sha256_hex(access_token))?;
        if removed {
            audit::record(
                &conn,
                audit::entry(
                    Some(claims.user_id),
                    "user.logout",
                    "user",
                    claims.sub.clone(),
                    ctx,
                    AuditStatus::Success,
                ),
            );
        }
        Ok(())
    }

    /// Close every session of `actor`.  Returns the number closed.
    pub async fn logout_all(
        &self,
        actor: &UserRecord,
        ctx: &RequestContext,
    ) -> Result<usize, AuthError> {
        let conn = self.store.lock().await;
        let removed = session_repo::delete_for_user(&conn, actor.id)?;
        audit::record(
            &conn,
            audit::entry(
                Some(actor.id),
                "user.logout_all",
                "user",
                actor.uuid.clone(),
                ctx,
                AuditStatus::Success,
            ),
        );
        Ok(removed)
    }

    /// True when `access_token` still maps to a live (not logged-out, not
    /// expired) session.
    pub async fn is_active_session(&self, access_token: &str) -> Result<bool, AuthError> {
        let conn = self.store.lock().await;
        let session = session_repo::get_by_session_hash(&conn, &sha256_hex(access_token))?;
        Ok(matches!(session, Some(s) if s.expires_at > Utc::now()))
    }

    /// Drop expired sessions; suitable for a periodic maintenance task.
    pub async fn sweep_expired(&self) -> Result<usize, AuthError> {
        let conn = self.store.lock().await;
        session_repo::delete_expired(&conn, Utc::now())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
