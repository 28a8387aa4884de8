//! # RBAC administration
//!
//! Role and permission CRUD, role assignment and account status. Authority over
//! a role's scope is checked before any read of the submitted permissions and
//! before any write.

use std::collections::BTreeSet;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    dto::{
        CreatePermissionRequest, CreateRoleRequest, UpdatePermissionRequest, UpdateRoleRequest,
        UserQuery, paging,
    },
    error::{AppError, AppResult},
    models::{
        AccountType, NewPermission, NewRole, Permission, PermissionChanges, Role, RoleChanges,
        RoleUserType, RoleWithPermissions, User, Visibility,
    },
    rbac::{check_permission_scope, ensure_can_manage_role_type, role_assignable},
    repository::{Page, RbacStore, RepositoryState, UserStore},
};

/// Order-preserving dedupe of submitted ids.
fn unique_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = BTreeSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

/// Merchants only ever see merchant-scoped roles and permissions.
fn visible_scope(
    actor: &AuthUser,
    requested: Option<RoleUserType>,
) -> AppResult<Option<RoleUserType>> {
    match (actor.account_type, requested) {
        (AccountType::Merchant, None) | (AccountType::Merchant, Some(RoleUserType::Merchant)) => {
            Ok(Some(RoleUserType::Merchant))
        }
        (AccountType::Merchant, Some(other)) => Err(AppError::forbidden(format!(
            "Merchant accounts cannot view {} roles",
            other
        ))),
        (_, requested) => Ok(requested),
    }
}

/// A merchant reaches only the roles it built. Admins reach every role their
/// scope allows.
fn within_reach(actor: &AuthUser, role: &Role) -> bool {
    match actor.account_type {
        AccountType::Merchant => {
            role.user_type == RoleUserType::Merchant && role.created_by == Some(actor.id)
        }
        _ => true,
    }
}

#[derive(Clone)]
pub struct RoleService {
    repo: RepositoryState,
}

impl RoleService {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    /// Resolves `ids` to permissions of `scope`. Unknown ids are 404, ids of
    /// another scope are a validation error on `permissionIds`.
    async fn scoped_permissions(&self, scope: RoleUserType, ids: &[Uuid]) -> AppResult<Vec<Uuid>> {
        let ids = unique_ids(ids);
        if ids.is_empty() {
            return Ok(ids);
        }
        let found = self.repo.find_permissions(&ids).await?;
        if found.len() != ids.len() {
            let known: BTreeSet<Uuid> = found.iter().map(|p| p.id).collect();
            let missing: Vec<String> = ids
                .iter()
                .filter(|id| !known.contains(id))
                .map(Uuid::to_string)
                .collect();
            return Err(AppError::not_found(format!(
                "Permission(s) not found: {}",
                missing.join(", ")
            )));
        }
        check_permission_scope(scope, &found)?;
        Ok(ids)
    }

    /// Loads a role the actor may see. Roles out of reach read as missing.
    async fn load_role(&self, actor: &AuthUser, id: Uuid) -> AppResult<RoleWithPermissions> {
        self.repo
            .find_role(id)
            .await?
            .filter(|role| within_reach(actor, &role.role))
            .ok_or_else(|| AppError::not_found("Role not found"))
    }

    // --- Roles ---

    pub async fn create_role(
        &self,
        actor: &AuthUser,
        req: CreateRoleRequest,
    ) -> AppResult<RoleWithPermissions> {
        ensure_can_manage_role_type(actor, req.user_type)?;

        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::field("name", "Role name is required"));
        }
        if self.repo.role_name_taken(&name, None).await? {
            return Err(AppError::conflict("A role with this name already exists"));
        }
        let permission_ids = self
            .scoped_permissions(req.user_type, &req.permission_ids)
            .await?;

        let role = self
            .repo
            .create_role(NewRole {
                name,
                user_type: req.user_type,
                description: trimmed(req.description),
                created_by: (actor.account_type == AccountType::Merchant).then_some(actor.id),
                permission_ids,
            })
            .await?;

        tracing::info!(
            role_id = %role.role.id,
            user_type = %role.role.user_type,
            actor = %actor.id,
            "role created"
        );
        Ok(role)
    }

    pub async fn list_roles(
        &self,
        actor: &AuthUser,
        user_type: Option<RoleUserType>,
    ) -> AppResult<Vec<RoleWithPermissions>> {
        let scope = visible_scope(actor, user_type)?;
        let mut roles = self.repo.list_roles(scope).await?;
        roles.retain(|role| within_reach(actor, &role.role));
        Ok(roles)
    }

    pub async fn get_role(&self, actor: &AuthUser, id: Uuid) -> AppResult<RoleWithPermissions> {
        self.load_role(actor, id).await
    }

    pub async fn update_role(
        &self,
        actor: &AuthUser,
        id: Uuid,
        req: UpdateRoleRequest,
    ) -> AppResult<RoleWithPermissions> {
        let current = self.load_role(actor, id).await?;
        ensure_can_manage_role_type(actor, current.role.user_type)?;

        let name = trimmed(req.name);
        if let Some(name) = &name {
            if name.is_empty() {
                return Err(AppError::field("name", "Role name is required"));
            }
            if self.repo.role_name_taken(name, Some(id)).await? {
                return Err(AppError::conflict("A role with this name already exists"));
            }
        }
        let permission_ids = match req.permission_ids {
            Some(ids) => Some(self.scoped_permissions(current.role.user_type, &ids).await?),
            None => None,
        };

        self.repo
            .update_role(
                id,
                RoleChanges {
                    name,
                    description: trimmed(req.description),
                    permission_ids,
                },
            )
            .await?
            .ok_or_else(|| AppError::not_found("Role not found"))
    }

    pub async fn delete_role(&self, actor: &AuthUser, id: Uuid) -> AppResult<()> {
        let current = self.load_role(actor, id).await?;
        ensure_can_manage_role_type(actor, current.role.user_type)?;
        if !self.repo.delete_role(id).await? {
            return Err(AppError::not_found("Role not found"));
        }
        tracing::info!(role_id = %id, actor = %actor.id, "role deleted");
        Ok(())
    }

    // --- Permissions ---

    pub async fn create_permission(&self, req: CreatePermissionRequest) -> AppResult<Permission> {
        let name = req.name.trim().to_string();
        if self.repo.permission_name_taken(&name, None).await? {
            return Err(AppError::conflict("A permission with this name already exists"));
        }
        self.repo
            .create_permission(NewPermission {
                category: req.category.trim().to_string(),
                name,
                user_type: req.user_type,
                description: trimmed(req.description),
            })
            .await
    }

    pub async fn list_permissions(
        &self,
        actor: &AuthUser,
        user_type: Option<RoleUserType>,
    ) -> AppResult<Vec<Permission>> {
        let scope = visible_scope(actor, user_type)?;
        self.repo.list_permissions(scope).await
    }

    pub async fn get_permission(&self, id: Uuid) -> AppResult<Permission> {
        self.repo
            .find_permission(id)
            .await?
            .ok_or_else(|| AppError::not_found("Permission not found"))
    }

    pub async fn update_permission(
        &self,
        id: Uuid,
        req: UpdatePermissionRequest,
    ) -> AppResult<Permission> {
        let name = trimmed(req.name);
        if let Some(name) = &name {
            if self.repo.permission_name_taken(name, Some(id)).await? {
                return Err(AppError::conflict("A permission with this name already exists"));
            }
        }
        self.repo
            .update_permission(
                id,
                PermissionChanges {
                    category: trimmed(req.category),
                    name,
                    description: trimmed(req.description),
                },
            )
            .await?
            .ok_or_else(|| AppError::not_found("Permission not found"))
    }

    pub async fn delete_permission(&self, id: Uuid) -> AppResult<()> {
        if !self.repo.delete_permission(id).await? {
            return Err(AppError::not_found("Permission not found"));
        }
        Ok(())
    }

    // --- Users ---

    /// assign_roles
    ///
    /// Replaces the user's role set. Every role must exist, fit the user's
    /// account type, and be within the actor's authority.
    pub async fn assign_roles(
        &self,
        actor: &AuthUser,
        user_id: Uuid,
        role_ids: &[Uuid],
    ) -> AppResult<Vec<RoleWithPermissions>> {
        let user = self
            .repo
            .find_user(user_id, Visibility::Live)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        let role_ids = unique_ids(role_ids);
        let mut roles = Vec::with_capacity(role_ids.len());
        for id in &role_ids {
            roles.push(
                self.repo
                    .find_role(*id)
                    .await?
                    .ok_or_else(|| AppError::not_found(format!("Role not found: {}", id)))?,
            );
        }

        for role in &roles {
            if !role_assignable(user.account_type, role.role.user_type) {
                return Err(AppError::field(
                    "roleIds",
                    format!(
                        "{} roles cannot be assigned to {} accounts",
                        role.role.user_type, user.account_type
                    ),
                ));
            }
            ensure_can_manage_role_type(actor, role.role.user_type)?;
        }

        self.repo.set_user_roles(user.id, &role_ids).await?;
        tracing::info!(
            user_id = %user.id,
            roles = role_ids.len(),
            actor = %actor.id,
            "roles assigned"
        );
        self.repo.user_roles(user.id).await
    }

    /// Sets `is_active`, or inverts it when no value is given. Nobody can
    /// disable their own account, and only super admins can disable one.
    pub async fn set_user_status(
        &self,
        actor: &AuthUser,
        user_id: Uuid,
        value: Option<bool>,
    ) -> AppResult<User> {
        let user = self
            .repo
            .find_user(user_id, Visibility::Live)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        let is_active = value.unwrap_or(!user.is_active);
        if !is_active && user.id == actor.id {
            return Err(AppError::bad_request("You cannot deactivate your own account"));
        }
        if user.is_super_admin && !actor.is_super_admin {
            return Err(AppError::forbidden(
                "Only a super admin can change the status of a super admin",
            ));
        }

        let updated = self
            .repo
            .set_user_active(user.id, is_active)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;
        tracing::info!(user_id = %updated.id, is_active, actor = %actor.id, "user status changed");
        Ok(updated)
    }

    pub async fn list_users(&self, query: UserQuery) -> AppResult<(Page<User>, u64, u64)> {
        let (page, limit) = paging(query.page, query.limit);
        let users = self.repo.list_users(query.account_type, page, limit).await?;
        Ok((users, page, limit))
    }
}
