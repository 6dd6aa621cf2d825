// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Roles, permissions, and API-token scopes.
//!
//! Role→permission and scope→permission mappings are fixed static tables.
//! Scopes and permissions live in distinct namespaces: scopes gate API
//! tokens, permissions gate users through their role; session-based auth
//! falls back through the scope→permission conversion when no API token is
//! present.

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
    ReadOnly,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
            Self::ReadOnly => "readonly",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AuthError> {
        match s {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            "readonly" => Ok(Self::ReadOnly),
            other => Err(AuthError::InvalidInput(format!("unknown role {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "users:read")]
    UsersRead,
    #[serde(rename = "users:write")]
    UsersWrite,
    #[serde(rename = "tokens:read")]
    TokensRead,
    #[serde(rename = "tokens:write")]
    TokensWrite,
    #[serde(rename = "audit:read")]
    AuditRead,
    #[serde(rename = "system:admin")]
    SystemAdmin,
}

/// Named grants attached to API tokens.  `admin:all` subsumes every other
/// scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    #[serde(rename = "admin:all")]
    AdminAll,
    #[serde(rename = "users:read")]
    UsersRead,
    #[serde(rename = "users:write")]
    UsersWrite,
    #[serde(rename = "tokens:read")]
    TokensRead,
    #[serde(rename = "tokens:write")]
    TokensWrite,
    #[serde(rename = "audit:read")]
    AuditRead,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AdminAll => "admin:all",
            Self::UsersRead => "users:read",
            Self::UsersWrite => "users:write",
            Self::TokensRead => "tokens:read",
            Self::TokensWrite => "tokens:write",
            Self::AuditRead => "audit:read",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AuthError> {
        match s {
            "admin:all" => Ok(Self::AdminAll),
            "users:read" => Ok(Self::UsersRead),
            "users:write" => Ok(Self::UsersWrite),
            "tokens:read" => Ok(Self::TokensRead),
            "tokens:write" => Ok(Self::TokensWrite),
            "audit:read" => Ok(Self::AuditRead),
            other => Err(AuthError::InvalidInput(format!("unknown scope {other:?}"))),
        }
    }

    /// The permission a scope converts to for session-based fallback.
    pub fn permission(self) -> Permission {
        match self {
            Self::AdminAll => Permission::SystemAdmin,
            Self::UsersRead => Permission::UsersRead,
            Self::UsersWrite => Permission::UsersWrite,
            Self::TokensRead => Permission::TokensRead,
            Self::TokensWrite => Permission::TokensWrite,
            Self::AuditRead => Permission::AuditRead,
        }
    }
}

/// Static role→permission table.
pub fn permissions_for(role: Role) -> &'static [Permission] {
    match role {
        Role::Admin => &[
            Permission::UsersRead,
            Permission::UsersWrite,
            Permission::TokensRead,
            Permission::TokensWrite,
            Permission::AuditRead,
            Permission::SystemAdmin,
        ],
        Role::User => &[
            Permission::UsersRead,
            Permission::TokensRead,
            Permission::TokensWrite,
        ],
        Role::ReadOnly => &[Permission::UsersRead, Permission::TokensRead],
    }
}

pub fn has_permission(role: Role, permission: Permission) -> bool {
    permissions_for(role).contains(&permission)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_strings() {
        for role in [Role::Admin, Role::User, Role::ReadOnly] {
            assert_eq!(Role::parse(role.as_str()).unwrap(), role);
        }
        assert!(Role::parse("root").is_err());
    }

    #[test]
    fn scope_round_trips_through_strings() {
        for scope in [
            Scope::AdminAll,
            Scope::UsersRead,
            Scope::UsersWrite,
            Scope::TokensRead,
            Scope::TokensWrite,
            Scope::AuditRead,
        ] {
            assert_eq!(Scope::parse(scope.as_str()).unwrap(), scope);
        }
        assert!(Scope::parse("everything").is_err());
    }

    #[test]
    fn admin_has_every_permission() {
        for p in [
            Permission::UsersRead,
            Permission::UsersWrite,
            Permission::TokensRead,
            Permission::TokensWrite,
            Permission::AuditRead,
            Permission::SystemAdmin,
        ] {
            assert!(has_permission(Role::Admin, p));
        }
    }

    #[test]
    fn readonly_cannot_write() {
        assert!(!has_permission(Role::ReadOnly, Permission::UsersWrite));
        assert!(!has_permission(Role::ReadOnly, Permission::TokensWrite));
        assert!(has_permission(Role::ReadOnly, Permission::UsersRead));
    }

    #[test]
    fn user_cannot_administer() {
        assert!(!has_permission(Role::User, Permission::SystemAdmin));
        assert!(!has_permission(Role::User, Permission::UsersWrite));
        assert!(has_permission(Role::User, Permission::TokensWrite));
    }

    #[test]
    fn scope_serializes_with_colon_form() {
        assert_eq!(serde_json::to_string(&Scope::AdminAll).unwrap(), "\"admin:all\"");
        let s: Scope = serde_json::from_str("\"users:read\"").unwrap();
        assert_eq!(s, Scope::UsersRead);
    }
}
