// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Typed failures of the identity and access core.
///
/// The transport layer maps these onto HTTP codes via
/// [`AuthError::http_status`]; everything that reveals whether a principal
/// exists is collapsed into [`AuthError::InvalidCredentials`].
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    AlreadyExists(&'static str),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("token invalid: {0}")]
    TokenInvalid(String),

    #[error("token expired")]
    TokenExpired,

    #[error("token inactive")]
    TokenInactive,

    #[error("user inactive")]
    UserInactive,

    #[error("session expired")]
    SessionExpired,

    #[error("operation may not target the acting user")]
    SelfAction,

    #[error("the last active admin may not be removed or deactivated")]
    LastAdmin,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl AuthError {
    /// HTTP status code the transport layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::Unauthorized
            | Self::InvalidCredentials
            | Self::TokenInvalid(_)
            | Self::TokenExpired
            | Self::TokenInactive
            | Self::UserInactive
            | Self::SessionExpired => 401,
            Self::Forbidden | Self::SelfAction | Self::LastAdmin => 403,
            Self::NotFound(_) => 404,
            Self::AlreadyExists(_) => 409,
            Self::Config(_) | Self::Storage(_) => 500,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
