// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Identity and access core: Argon2id password hashing, HS256 access/refresh
//! credential pairs, opaque API tokens hashed at rest, role→permission
//! resolution, login sessions, and append-only audit logging over an
//! isolated SQLite store.

pub mod apitoken;
pub mod audit;
pub mod credential;
pub mod error;
pub mod middleware;
pub mod password;
pub mod roles;
pub mod session;
pub mod store;
pub mod user;

pub use apitoken::{ApiTokenService, NewTokenRequest, TokenPatch, TOKEN_PREFIX};
pub use audit::{AuditService, RequestContext};
pub use credential::{Claims, CredentialConfig, CredentialKind, CredentialPair, CredentialService};
pub use error::AuthError;
pub use middleware::{bearer_auth_mw, AuthState, Identity};
pub use password::{PasswordParams, PasswordService};
pub use roles::{has_permission, permissions_for, Permission, Role, Scope};
pub use session::{LoginOutcome, SessionService};
pub use store::{
    ApiTokenRecord, AuditFilter, AuditRecord, AuditStatus, SessionRecord, Store, UserRecord,
};
pub use user::{NewUserRequest, UserPatch, UserService};

use std::sync::Arc;

use prism_config::AuthSettings;

/// All identity services wired over one store.
pub struct AuthCore {
    pub store: Arc<Store>,
    pub users: Arc<UserService>,
    pub tokens: Arc<ApiTokenService>,
    pub sessions: Arc<SessionService>,
    pub credentials: Arc<CredentialService>,
    pub audit: Arc<AuditService>,
}

impl AuthCore {
    /// Assemble the core from configuration.
    ///
    /// The signing secret comes from `auth.secret_env` (preferred) or
    /// `auth.secret`; the store lives beneath `auth.base_dir`, defaulting to
    /// the platform data directory.
    pub fn from_settings(settings: &AuthSettings) -> Result<Self, AuthError> {
        let secret = resolve_secret(settings)?;
        let base_dir = match &settings.base_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .ok_or_else(|| AuthError::Config("no data directory available".into()))?
                .join("prism"),
        };
        let store = Arc::new(Store::open(&base_dir)?);
        let credentials = Arc::new(CredentialService::new(CredentialConfig {
            secret,
            issuer: settings.issuer.clone(),
            access_ttl: settings.access_ttl,
            refresh_ttl: settings.refresh_ttl,
        })?);
        Ok(Self::assemble(store, credentials))
    }

    /// Assemble over an existing store (tests, embedded deployments).
    pub fn with_store(
        store: Arc<Store>,
        credentials: Arc<CredentialService>,
    ) -> Self {
        Self::assemble(store, credentials)
    }

    fn assemble(store: Arc<Store>, credentials: Arc<CredentialService>) -> Self {
        let password = PasswordService::default();
        let users = Arc::new(UserService::new(Arc::clone(&store), password.clone()));
        let tokens = Arc::new(ApiTokenService::new(Arc::clone(&store)));
        let sessions = Arc::new(SessionService::new(
            Arc::clone(&store),
            Arc::clone(&credentials),
            password,
        ));
        let audit = Arc::new(AuditService::new(Arc::clone(&store)));
        Self { store, users, tokens, sessions, credentials, audit }
    }

    /// Middleware state over this core with default rate limits.
    pub fn auth_state(&self) -> AuthState {
        AuthState::with_defaults(
            Arc::clone(&self.credentials),
            Arc::clone(&self.tokens),
            Arc::clone(&self.users),
        )
    }
}

fn resolve_secret(settings: &AuthSettings) -> Result<String, AuthError> {
    if let Some(var) = &settings.secret_env {
        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                return Ok(value);
            }
        }
    }
    settings
        .secret
        .clone()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AuthError::Config("no credential secret configured".into()))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
