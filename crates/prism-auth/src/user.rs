// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! User lifecycle and role-based permission checks.
//!
//! Two invariants guard every destructive path: an actor never deletes or
//! deactivates itself (`SelfAction`), and the last active admin can neither
//! be deactivated nor deleted (`LastAdmin`, backed by a COUNT query).

use std::sync::Arc;

use tracing::info;

use crate::audit::{self, RequestContext};
use crate::error::AuthError;
use crate::password::PasswordService;
use crate::roles::{self, Permission, Role};
use crate::store::{user_repo, AuditStatus, Store, UserRecord};

const RESET_PASSWORD_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct NewUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub full_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub full_name: Option<String>,
    pub role: Option<Role>,
}

pub struct UserService {
    store: Arc<Store>,
    password: PasswordService,
}

impl UserService {
    pub fn new(store: Arc<Store>, password: PasswordService) -> Self {
        Self { store, password }
    }

    /// Create a user.  `actor` is `None` only during bootstrap (first-admin
    /// creation); any later caller must be an admin.
    pub async fn create(
        &self,
        actor: Option<&UserRecord>,
        request: NewUserRequest,
        ctx: &RequestContext,
    ) -> Result<UserRecord, AuthError> {
        if let Some(actor) = actor {
            require_admin(actor)?;
        }
        let username = request.username.trim();
        if username.is_empty() {
            return Err(AuthError::InvalidInput("username must not be empty".into()));
        }
        if !request.email.contains('@') {
            return Err(AuthError::InvalidInput("email address is malformed".into()));
        }
        self.password.validate_strength(&request.password)?;
        let password_hash = self.password.hash(&request.password)?;

        let conn = self.store.lock().await;
        let user = user_repo::insert(
            &conn,
            &user_repo::NewUser {
                username,
                email: request.email.trim(),
                password_hash: &password_hash,
                role: request.role,
                full_name: request.full_name.trim(),
            },
        )?;
        audit::record(
            &conn,
            audit::entry(
                actor.map(|a| a.id),
                "user.create",
                "user",
                user.uuid.clone(),
                ctx,
                AuditStatus::Success,
            ),
        );
        info!(username = %user.username, role = user.role.as_str(), "user created");
        Ok(user)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<UserRecord, AuthError> {
        let conn = self.store.lock().await;
        user_repo::get_by_id(&conn, id)?.ok_or(AuthError::NotFound("user"))
    }

    pub async fn get_by_uuid(&self, uuid: &str) -> Result<UserRecord, AuthError> {
        let conn = self.store.lock().await;
        user_repo::get_by_uuid(&conn, uuid)?.ok_or(AuthError::NotFound("user"))
    }

    pub async fn get_by_username(&self, username: &str) -> Result<UserRecord, AuthError> {
        let conn = self.store.lock().await;
        user_repo::get_by_username(&conn, username)?.ok_or(AuthError::NotFound("user"))
    }

    pub async fn list(&self, offset: i64, limit: i64) -> Result<(Vec<UserRecord>, i64), AuthError> {
        let conn = self.store.lock().await;
        user_repo::list(&conn, offset.max(0), limit.clamp(1, 1000))
    }

    /// Partial patch of `full_name` and `role`.
    pub async fn update(
        &self,
        actor: &UserRecord,
        target_id: i64,
        patch: UserPatch,
        ctx: &RequestContext,
    ) -> Result<UserRecord, AuthError> {
        require_admin(actor)?;
        let conn = self.store.lock().await;
        let target =
            user_repo::get_by_id(&conn, target_id)?.ok_or(AuthError::NotFound("user"))?;
        // Demoting the last active admin loses the same guarantee as
        // deactivating them.
        if matches!(patch.role, Some(role) if role != Role::Admin)
            && target.role == Role::Admin
            && target.is_active
            && user_repo::count_active_admins(&conn)? <= 1
        {
            return Err(AuthError::LastAdmin);
        }
        user_repo::update(&conn, target_id, patch.full_name.as_deref(), patch.role)?;
        audit::record(
            &conn,
            audit::entry(
                Some(actor.id),
                "user.update",
                "user",
                target.uuid.clone(),
                ctx,
                AuditStatus::Success,
            ),
        );
        user_repo::get_by_id(&conn, target_id)?.ok_or(AuthError::NotFound("user"))
    }

    pub async fn deactivate(
        &self,
        actor: &UserRecord,
        target_id: i64,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        require_admin(actor)?;
        let conn = self.store.lock().await;
        let target = Self::guarded_target(&conn, actor, target_id)?;
        user_repo::set_active(&conn, target.id, false)?;
        audit::record(
            &conn,
            audit::entry(
                Some(actor.id),
                "user.deactivate",
                "user",
                target.uuid.clone(),
                ctx,
                AuditStatus::Success,
            ),
        );
        Ok(())
    }

    pub async fn activate(
        &self,
        actor: &UserRecord,
        target_id: i64,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        require_admin(actor)?;
        let conn = self.store.lock().await;
        let target =
            user_repo::get_by_id(&conn, target_id)?.ok_or(AuthError::NotFound("user"))?;
        user_repo::set_active(&conn, target.id, true)?;
        audit::record(
            &conn,
            audit::entry(
                Some(actor.id),
                "user.activate",
                "user",
                target.uuid.clone(),
                ctx,
                AuditStatus::Success,
            ),
        );
        Ok(())
    }

    pub async fn delete(
        &self,
        actor: &UserRecord,
        target_id: i64,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        require_admin(actor)?;
        let conn = self.store.lock().await;
        let target = Self::guarded_target(&conn, actor, target_id)?;
        user_repo::delete(&conn, target.id)?;
        audit::record(
            &conn,
            audit::entry(
                Some(actor.id),
                "user.delete",
                "user",
                target.uuid.clone(),
                ctx,
                AuditStatus::Success,
            ),
        );
        info!(username = %target.username, "user deleted");
        Ok(())
    }

    /// Set a fresh random password for `target_id` and return it.
    pub async fn reset_password(
        &self,
        actor: &UserRecord,
        target_id: i64,
        ctx: &RequestContext,
    ) -> Result<String, AuthError> {
        require_admin(actor)?;
        let raw = self.password.generate(RESET_PASSWORD_LEN);
        let password_hash = self.password.hash(&raw)?;
        let conn = self.store.lock().await;
        let target =
            user_repo::get_by_id(&conn, target_id)?.ok_or(AuthError::NotFound("user"))?;
        user_repo::set_password_hash(&conn, target.id, &password_hash)?;
        audit::record(
            &conn,
            audit::entry(
                Some(actor.id),
                "user.password_reset",
                "user",
                target.uuid.clone(),
                ctx,
                AuditStatus::Success,
            ),
        );
        Ok(raw)
    }

    /// Change the acting user's own password.
    pub async fn change_password(
        &self,
        actor: &UserRecord,
        current: &str,
        new: &str,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        if !self.password.verify(current, &actor.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }
        self.password.validate_strength(new)?;
        let password_hash = self.password.hash(new)?;
        let conn = self.store.lock().await;
        user_repo::set_password_hash(&conn, actor.id, &password_hash)?;
        audit::record(
            &conn,
            audit::entry(
                Some(actor.id),
                "user.password_reset",
                "user",
                actor.uuid.clone(),
                ctx,
                AuditStatus::Success,
            ),
        );
        Ok(())
    }

    pub fn has_permission(&self, user: &UserRecord, permission: Permission) -> bool {
        roles::has_permission(user.role, permission)
    }

    /// Shared destructive-path guard: no self-targeting, and the last active
    /// admin stays.
    fn guarded_target(
        conn: &rusqlite::Connection,
        actor: &UserRecord,
        target_id: i64,
    ) -> Result<UserRecord, AuthError> {
        if actor.id == target_id {
            return Err(AuthError::SelfAction);
        }
        let target =
            user_repo::get_by_id(conn, target_id)?.ok_or(AuthError::NotFound("user"))?;
        if target.role == Role::Admin
            && target.is_active
            && user_repo::count_active_admins(conn)? <= 1
        {
            return Err(AuthError::LastAdmin);
        }
        Ok(target)
    }
}

fn require_admin(actor: &UserRecord) -> Result<(), AuthError> {
    if actor.role != Role::Admin {
        return Err(AuthError::Forbidden);
    }
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::PasswordParams;
    use crate::store::AuditFilter;

    fn password_service() -> PasswordService {
        PasswordService::new(PasswordParams {
            time_cost: 1,
            memory_kib: 8 * 1024,
            parallelism: 1,
            key_len: 32,
            salt_len: 16,
        })
    }

    fn service() -> UserService {
        UserService::new(Arc::new(Store::open_in_memory().unwrap()), password_service())
    }

    fn ctx() -> RequestContext {
        RequestContext::new("127.0.0.1", "tests")
    }

    fn new_user(username: &str, role: Role) -> NewUserRequest {
        NewUserRequest {
            username: username.into(),
            email: format!("{username}@example.com"),
            password: "Password1x".into(),
            role,
            full_name: username.to_uppercase(),
        }
    }

    async fn bootstrap_admin(svc: &UserService) -> UserRecord {
        svc.create(None, new_user("root", Role::Admin), &ctx()).await.unwrap()
    }

    #[tokio::test]
    async fn create_rejects_duplicate_username_and_email() {
        let svc = service();
        let admin = bootstrap_admin(&svc).await;
        svc.create(Some(&admin), new_user("alice", Role::User), &ctx()).await.unwrap();

        let err = svc
            .create(Some(&admin), new_user("alice", Role::User), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AlreadyExists("username")));

        let mut dup_email = new_user("alice2", Role::User);
        dup_email.email = "alice@example.com".into();
        let err = svc.create(Some(&admin), dup_email, &ctx()).await.unwrap_err();
        assert!(matches!(err, AuthError::AlreadyExists("email")));
    }

    #[tokio::test]
    async fn create_enforces_password_strength() {
        let svc = service();
        let mut weak = new_user("bob", Role::User);
        weak.password = "short".into();
        assert!(matches!(
            svc.create(None, weak, &ctx()).await,
            Err(AuthError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn non_admin_cannot_create_users() {
        let svc = service();
        let admin = bootstrap_admin(&svc).await;
        let user = svc
            .create(Some(&admin), new_user("alice", Role::User), &ctx())
            .await
            .unwrap();
        assert!(matches!(
            svc.create(Some(&user), new_user("eve", Role::User), &ctx()).await,
            Err(AuthError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn get_by_uuid_is_backed_by_a_real_query() {
        let svc = service();
        let admin = bootstrap_admin(&svc).await;
        let found = svc.get_by_uuid(&admin.uuid).await.unwrap();
        assert_eq!(found.id, admin.id);
        assert!(matches!(
            svc.get_by_uuid("00000000-0000-4000-8000-000000000000").await,
            Err(AuthError::NotFound("user"))
        ));
    }

    #[tokio::test]
    async fn update_patches_only_provided_fields() {
        let svc = service();
        let admin = bootstrap_admin(&svc).await;
        let user = svc
            .create(Some(&admin), new_user("alice", Role::User), &ctx())
            .await
            .unwrap();
        let updated = svc
            .update(
                &admin,
                user.id,
                UserPatch { full_name: Some("Alice Smith".into()), role: None },
                &ctx(),
            )
            .await
            .unwrap();
        assert_eq!(updated.full_name, "Alice Smith");
        assert_eq!(updated.role, Role::User, "role untouched");

        let promoted = svc
            .update(&admin, user.id, UserPatch { full_name: None, role: Some(Role::Admin) }, &ctx())
            .await
            .unwrap();
        assert_eq!(promoted.role, Role::Admin);
        assert_eq!(promoted.full_name, "Alice Smith", "name untouched");
    }

    #[tokio::test]
    async fn self_action_is_rejected() {
        let svc = service();
        let admin = bootstrap_admin(&svc).await;
        assert!(matches!(
            svc.deactivate(&admin, admin.id, &ctx()).await,
            Err(AuthError::SelfAction)
        ));
        assert!(matches!(svc.delete(&admin, admin.id, &ctx()).await, Err(AuthError::SelfAction)));
    }

    #[tokio::test]
    async fn last_admin_cannot_be_deactivated_or_deleted() {
        let svc = service();
        let root = bootstrap_admin(&svc).await;
        // A second admin acts on root while root is the only *other* admin…
        let second = svc
            .create(Some(&root), new_user("admin2", Role::Admin), &ctx())
            .await
            .unwrap();
        // …no guard trips while two active admins exist:
        svc.deactivate(&root, second.id, &ctx()).await.unwrap();

        // root is now the last active admin; a (re-activated, demoted-path)
        // actor cannot remove them.
        svc.activate(&root, second.id, &ctx()).await.unwrap();
        svc.deactivate(&root, second.id, &ctx()).await.unwrap();
        let err = svc.deactivate(&second, root.id, &ctx()).await.unwrap_err();
        assert!(matches!(err, AuthError::LastAdmin));
        let err = svc.delete(&second, root.id, &ctx()).await.unwrap_err();
        assert!(matches!(err, AuthError::LastAdmin));

        let still_root = svc.get_by_id(root.id).await.unwrap();
        assert!(still_root.is_active, "guard must leave is_active unchanged");
    }

    #[tokio::test]
    async fn demoting_last_admin_is_rejected() {
        let svc = service();
        let root = bootstrap_admin(&svc).await;
        let err = svc
            .update(&root, root.id, UserPatch { full_name: None, role: Some(Role::User) }, &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::LastAdmin));
    }

    #[tokio::test]
    async fn reset_password_returns_conforming_raw() {
        let svc = service();
        let admin = bootstrap_admin(&svc).await;
        let user = svc
            .create(Some(&admin), new_user("alice", Role::User), &ctx())
            .await
            .unwrap();
        let raw = svc.reset_password(&admin, user.id, &ctx()).await.unwrap();
        assert_eq!(raw.len(), 16);
        let reloaded = svc.get_by_id(user.id).await.unwrap();
        assert!(password_service().verify(&raw, &reloaded.password_hash).unwrap());
    }

    #[tokio::test]
    async fn change_password_requires_current() {
        let svc = service();
        let admin = bootstrap_admin(&svc).await;
        assert!(matches!(
            svc.change_password(&admin, "Wrong1Password", "NewPass1word", &ctx()).await,
            Err(AuthError::InvalidCredentials)
        ));
        svc.change_password(&admin, "Password1x", "NewPass1word", &ctx()).await.unwrap();
        let reloaded = svc.get_by_id(admin.id).await.unwrap();
        assert!(password_service().verify("NewPass1word", &reloaded.password_hash).unwrap());
    }

    #[tokio::test]
    async fn list_paginates_with_total() {
        let svc = service();
        let admin = bootstrap_admin(&svc).await;
        for i in 0..4 {
            svc.create(Some(&admin), new_user(&format!("user{i}"), Role::User), &ctx())
                .await
                .unwrap();
        }
        let (page, total) = svc.list(0, 2).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        let (rest, _) = svc.list(4, 10).await.unwrap();
        assert_eq!(rest.len(), 1);
    }

    #[tokio::test]
    async fn mutations_leave_an_audit_trail() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let svc = UserService::new(Arc::clone(&store), password_service());
        let admin = bootstrap_admin(&svc).await;
        let user = svc
            .create(Some(&admin), new_user("alice", Role::User), &ctx())
            .await
            .unwrap();
        svc.deactivate(&admin, user.id, &ctx()).await.unwrap();

        let audit = crate::audit::AuditService::new(store);
        let (rows, _) = audit
            .list(
                &AuditFilter { resource_type: Some("user".into()), ..Default::default() },
                0,
                10,
            )
            .await
            .unwrap();
        let actions: Vec<&str> = rows.iter().map(|r| r.action.as_str()).collect();
        assert!(actions.contains(&"user.create"));
        assert!(actions.contains(&"user.deactivate"));
    }

    #[tokio::test]
    async fn cascade_deletes_tokens_with_user() {
        use crate::apitoken::{ApiTokenService, NewTokenRequest};
        let store = Arc::new(Store::open_in_memory().unwrap());
        let users = UserService::new(Arc::clone(&store), password_service());
        let tokens = ApiTokenService::new(Arc::clone(&store));
        let admin = bootstrap_admin(&users).await;
        let alice = users
            .create(Some(&admin), new_user("alice", Role::User), &ctx())
            .await
            .unwrap();
        let (_record, raw) = tokens
            .create(
                &alice,
                alice.id,
                NewTokenRequest { name: "ci".into(), scopes: vec![], expires_at: None },
                &ctx(),
            )
            .await
            .unwrap();

        users.delete(&admin, alice.id, &ctx()).await.unwrap();
        assert!(matches!(tokens.validate(&raw).await, Err(AuthError::TokenInvalid(_))));
    }
}
