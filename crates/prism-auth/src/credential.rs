// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Access/refresh credential pairs.
//!
//! Credentials are HS256 JWTs; no other signature algorithm is accepted.
//! The `kind` claim pins each string to one validation path so a refresh
//! token can never authenticate a request and vice versa.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::roles::Role;
use crate::store::UserRecord;

/// Minimum secret length: 128 bits.
const MIN_SECRET_BYTES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    Access,
    Refresh,
}

/// The canonical claim set carried by both credential kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's UUID.
    pub sub: String,
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub kind: CredentialKind,
    pub iss: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct CredentialPair {
    pub access: String,
    pub refresh: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CredentialConfig {
    pub secret: String,
    pub issuer: String,
    pub access_ttl: std::time::Duration,
    pub refresh_ttl: std::time::Duration,
}

impl CredentialConfig {
    pub fn new(secret: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: issuer.into(),
            access_ttl: std::time::Duration::from_secs(15 * 60),
            refresh_ttl: std::time::Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

pub struct CredentialService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    access_ttl: ChronoDuration,
    refresh_ttl: ChronoDuration,
}

impl std::fmt::Debug for CredentialService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialService")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

impl CredentialService {
    pub fn new(config: CredentialConfig) -> Result<Self, AuthError> {
        if config.secret.len() < MIN_SECRET_BYTES {
            return Err(AuthError::Config(format!(
                "credential secret must be at least {MIN_SECRET_BYTES} bytes"
            )));
        }
        let access_ttl = ChronoDuration::from_std(config.access_ttl)
            .map_err(|e| AuthError::Config(format!("bad access ttl: {e}")))?;
        let refresh_ttl = ChronoDuration::from_std(config.refresh_ttl)
            .map_err(|e| AuthError::Config(format!("bad refresh ttl: {e}")))?;
        Ok(Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer,
            access_ttl,
            refresh_ttl,
        })
    }

    /// Issue a fresh access/refresh pair for `user`.
    pub fn issue_pair(&self, user: &UserRecord) -> Result<CredentialPair, AuthError> {
        let now = Utc::now();
        let access_expires_at = now + self.access_ttl;
        let refresh_expires_at = now + self.refresh_ttl;
        Ok(CredentialPair {
            access: self.issue(user, CredentialKind::Access, now, access_expires_at)?,
            refresh: self.issue(user, CredentialKind::Refresh, now, refresh_expires_at)?,
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Validate an access credential.
    pub fn validate_access(&self, token: &str) -> Result<Claims, AuthError> {
        self.validate(token, CredentialKind::Access)
    }

    /// Validate a refresh credential.
    pub fn validate_refresh(&self, token: &str) -> Result<Claims, AuthError> {
        self.validate(token, CredentialKind::Refresh)
    }

    /// Reissue an access credential from a valid refresh credential.  The
    /// refresh must belong to `user`, who must be active.
    pub fn refresh_access(
        &self,
        refresh_token: &str,
        user: &UserRecord,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let claims = self.validate_refresh(refresh_token)?;
        if claims.user_id != user.id {
            return Err(AuthError::TokenInvalid("refresh token belongs to another user".into()));
        }
        if !user.is_active {
            return Err(AuthError::UserInactive);
        }
        let now = Utc::now();
        let expires_at = now + self.access_ttl;
        Ok((self.issue(user, CredentialKind::Access, now, expires_at)?, expires_at))
    }

    fn issue(
        &self,
        user: &UserRecord,
        kind: CredentialKind,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            sub: user.uuid.clone(),
            user_id: user.id,
            username: user.username.clone(),
            role: user.role,
            kind,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Config(format!("signing credential: {e}")))
    }

    fn validate(&self, token: &str, expected: CredentialKind) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_nbf = true;
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map_err(map_jwt_error)?;
        if data.claims.kind != expected {
            return Err(AuthError::TokenInvalid("wrong credential kind".into()));
        }
        Ok(data.claims)
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::TokenInvalid(err.to_string()),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
