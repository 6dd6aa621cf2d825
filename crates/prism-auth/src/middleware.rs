// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! HTTP bearer authentication middleware and per-IP rate limiting.
//!
//! All protected requests present `Authorization: Bearer <token>` (scheme
//! match is case-insensitive; other schemes are treated as missing).
//! Access-credential validation runs first; API-token validation is the
//! fallback.  On success the resolved [`Identity`] is attached to the
//! request extensions and, for API tokens, usage is recorded off the
//! request path.
//!
//! Rate limiting uses the `governor` crate (GCRA algorithm) keyed by client
//! IP and is applied **only to failed attempts**, so legitimate clients are
//! never throttled by their own traffic.  Loopback is exempt.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{clock::DefaultClock, state::keyed::DashMapStateStore, Quota, RateLimiter};
use tracing::warn;

use crate::apitoken::ApiTokenService;
use crate::credential::CredentialService;
use crate::error::AuthError;
use crate::store::{ApiTokenRecord, UserRecord};
use crate::user::UserService;

/// The authenticated principal bound to a request.
#[derive(Clone)]
pub struct Identity {
    pub user: UserRecord,
    /// Present when authentication used an API token rather than an access
    /// credential.
    pub token: Option<ApiTokenRecord>,
}

type IpLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>;

/// Shared auth state threaded through axum middleware.
#[derive(Clone)]
pub struct AuthState {
    credentials: Arc<CredentialService>,
    tokens: Arc<ApiTokenService>,
    users: Arc<UserService>,
    limiter: Arc<IpLimiter>,
}

impl AuthState {
    /// `max_per_minute`: failed attempts allowed per IP per minute; `burst`:
    /// attempts allowed in a burst before the limit kicks in.
    pub fn new(
        credentials: Arc<CredentialService>,
        tokens: Arc<ApiTokenService>,
        users: Arc<UserService>,
        max_per_minute: u32,
        burst: u32,
    ) -> Result<Self, AuthError> {
        let per_minute = NonZeroU32::new(max_per_minute)
            .ok_or_else(|| AuthError::Config("max_per_minute must be > 0".into()))?;
        let burst = NonZeroU32::new(burst)
            .ok_or_else(|| AuthError::Config("burst must be > 0".into()))?;
        let quota = Quota::per_minute(per_minute).allow_burst(burst);
        Ok(Self {
            credentials,
            tokens,
            users,
            limiter: Arc::new(RateLimiter::keyed(quota)),
        })
    }

    /// Default configuration: 5 failed attempts per minute, burst of 2.
    pub fn with_defaults(
        credentials: Arc<CredentialService>,
        tokens: Arc<ApiTokenService>,
        users: Arc<UserService>,
    ) -> Self {
        Self::new(credentials, tokens, users, 5, 2)
            .unwrap_or_else(|_| unreachable!("static non-zero quota"))
    }

    /// Resolve a bearer string to an identity: access credential first, API
    /// token as fallback.
    pub async fn authenticate(&self, bearer: &str) -> Result<Identity, AuthError> {
        match self.credentials.validate_access(bearer) {
            Ok(claims) => {
                let user = self.users.get_by_id(claims.user_id).await?;
                if !user.is_active {
                    return Err(AuthError::UserInactive);
                }
                Ok(Identity { user, token: None })
            }
            Err(_) => {
                let token = self.tokens.validate(bearer).await?;
                let user = self.users.get_by_id(token.user_id).await?;
                if !user.is_active {
                    return Err(AuthError::UserInactive);
                }
                let tokens = Arc::clone(&self.tokens);
                let token_id = token.id;
                tokio::spawn(async move { tokens.record_usage(token_id).await });
                Ok(Identity { user, token: Some(token) })
            }
        }
    }
}

// ── Middleware ────────────────────────────────────────────────────────────────

/// Axum middleware verifying the bearer and attaching [`Identity`].
///
/// Returns `401 Unauthorized` on missing/invalid credentials and `429 Too
/// Many Requests` (with Retry-After) when an IP accumulates failures.
pub async fn bearer_auth_mw(
    State(state): State<AuthState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut req: Request,
    next: Next,
) -> Response {
    let bearer = extract_bearer(req.headers());
    match bearer {
        Some(token) => match state.authenticate(token).await {
            Ok(identity) => {
                req.extensions_mut().insert(identity);
                next.run(req).await
            }
            Err(e) => reject(&state, addr.ip(), &e),
        },
        None => reject(&state, addr.ip(), &AuthError::Unauthorized),
    }
}

fn reject(state: &AuthState, ip: IpAddr, error: &AuthError) -> Response {
    // Failed auth consumes a rate-limit token; loopback is exempt so local
    // tooling is never locked out.
    if !is_loopback(ip) && state.limiter.check_key(&ip).is_err() {
        warn!(%ip, "rate limit exceeded after repeated auth failures");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(axum::http::header::RETRY_AFTER, "60")],
            "Too Many Requests",
        )
            .into_response();
    }
    warn!(%ip, error = %error, "authentication failed");
    (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Extract the bearer token; the scheme is matched case-insensitively and
/// any other scheme counts as missing.
fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, value) = auth.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4 == Ipv4Addr::LOCALHOST,
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
