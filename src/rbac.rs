//! # Access control
//!
//! One gate for every protected route. A route declares an `AccessPolicy`: the
//! account types it admits and, per account type, the permissions the caller's
//! roles must grant. The gate authenticates, checks the account type, then
//! checks permissions. Super admins skip the permission check only.

use axum::{
    extract::{FromRef, Request, State},
    middleware::Next,
    response::Response,
};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::{
    AppState,
    auth::AuthUser,
    config::AppConfig,
    error::{AppError, AppResult},
    models::{
        AccountType, ContentAction, ContentKind, Permission, RoleUserType, RoleWithPermissions,
    },
    repository::{RbacStore, RepositoryState},
};

/// The permissions one account type must hold to pass a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub account_type: AccountType,
    pub permissions: Vec<String>,
}

/// AccessPolicy
///
/// Built once per route at router assembly. An empty policy admits nobody.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    grants: Vec<Grant>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits `account_type` when its roles grant every one of `permissions`.
    pub fn allow<I, P>(mut self, account_type: AccountType, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.grants.push(Grant {
            account_type,
            permissions: permissions.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Admits `account_type` on authentication alone.
    pub fn allow_any(self, account_type: AccountType) -> Self {
        self.allow(account_type, Vec::<String>::new())
    }

    pub fn admits(&self, account_type: AccountType) -> bool {
        self.grants.iter().any(|g| g.account_type == account_type)
    }

    /// The permissions required of `account_type`, or `None` when it is not admitted.
    pub fn required_for(&self, account_type: AccountType) -> Option<&[String]> {
        self.grants
            .iter()
            .find(|g| g.account_type == account_type)
            .map(|g| g.permissions.as_slice())
    }

    /// content
    ///
    /// The policy guarding `action` on `kind`. Admin-curated kinds admit admins
    /// with the kind's admin permission. Merchant listings admit merchants with
    /// the merchant permission, and admins through `{kind}.moderate`, except for
    /// creation, which stays with merchants. Verification is admin-only everywhere.
    pub fn content(kind: ContentKind, action: ContentAction) -> Self {
        match (kind.managed_by(), action) {
            (_, ContentAction::Verify) | (_, ContentAction::Moderate) => {
                Self::new().allow(AccountType::Admin, [kind.permission(action)])
            }
            (AccountType::Merchant, ContentAction::Create) => {
                Self::new().allow(AccountType::Merchant, [kind.permission(action)])
            }
            (AccountType::Merchant, _) => Self::new()
                .allow(AccountType::Merchant, [kind.permission(action)])
                .allow(AccountType::Admin, [kind.permission(ContentAction::Moderate)]),
            _ => Self::new().allow(AccountType::Admin, [kind.permission(action)]),
        }
    }
}

/// Set union of every permission name granted by `roles`.
pub fn granted_permissions(roles: &[RoleWithPermissions]) -> HashSet<String> {
    roles
        .iter()
        .flat_map(|r| r.permissions.iter().map(|p| p.name.clone()))
        .collect()
}

/// `required \ granted`, in declaration order.
pub fn missing_permissions(required: &[String], granted: &HashSet<String>) -> Vec<String> {
    required
        .iter()
        .filter(|p| !granted.contains(*p))
        .cloned()
        .collect()
}

/// authorize
///
/// Account-type gating first, then permission gating. Reads only; never writes.
pub async fn authorize<R>(repo: &R, user: &AuthUser, policy: &AccessPolicy) -> AppResult<()>
where
    R: RbacStore + ?Sized,
{
    let required = policy.required_for(user.account_type).ok_or_else(|| {
        AppError::forbidden(format!(
            "{} accounts cannot access this resource",
            capitalize(user.account_type.as_str())
        ))
    })?;

    if user.is_super_admin || required.is_empty() {
        return Ok(());
    }

    let roles = repo.user_roles(user.id).await?;
    let missing = missing_permissions(required, &granted_permissions(&roles));
    if !missing.is_empty() {
        tracing::debug!(user_id = %user.id, ?missing, "permission check failed");
        return Err(AppError::forbidden(format!(
            "Missing required permission(s): {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Gate
///
/// Middleware state: the application state plus the policy of the routes the
/// layer wraps. `AuthUser` resolves against it through `FromRef`.
#[derive(Clone)]
pub struct Gate {
    state: AppState,
    policy: Arc<AccessPolicy>,
}

impl Gate {
    pub fn new(state: &AppState, policy: AccessPolicy) -> Self {
        Self {
            state: state.clone(),
            policy: Arc::new(policy),
        }
    }
}

impl FromRef<Gate> for RepositoryState {
    fn from_ref(gate: &Gate) -> RepositoryState {
        gate.state.repo.clone()
    }
}

impl FromRef<Gate> for AppConfig {
    fn from_ref(gate: &Gate) -> AppConfig {
        gate.state.config.clone()
    }
}

/// gate
///
/// `from_fn_with_state` middleware. Authentication failures are 401 (from the
/// `AuthUser` extractor); policy failures are 403. The resolved `AuthUser` is
/// left in the request extensions for the handler.
pub async fn gate(
    State(gate): State<Gate>,
    user: AuthUser,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(gate.state.repo.as_ref(), &user, &gate.policy).await?;
    Ok(next.run(request).await)
}

// --- Role authority ---

/// Who may create, change or delete a role of `user_type`: `system` roles only a
/// super admin, `admin` roles only admins, `merchant` roles admins or merchants.
pub fn ensure_can_manage_role_type(user: &AuthUser, user_type: RoleUserType) -> AppResult<()> {
    let allowed = match user_type {
        RoleUserType::System => user.is_super_admin,
        RoleUserType::Admin => user.account_type == AccountType::Admin,
        RoleUserType::Merchant => {
            matches!(user.account_type, AccountType::Admin | AccountType::Merchant)
        }
    };
    if allowed {
        Ok(())
    } else {
        Err(AppError::forbidden(format!(
            "You are not allowed to manage {} roles",
            user_type
        )))
    }
}

/// Which role scopes can be assigned to a user of `account_type`.
pub fn role_assignable(account_type: AccountType, role_type: RoleUserType) -> bool {
    matches!(
        (account_type, role_type),
        (AccountType::Admin, RoleUserType::Admin)
            | (AccountType::Admin, RoleUserType::System)
            | (AccountType::Merchant, RoleUserType::Merchant)
    )
}

/// A role may only hold permissions of its own scope. Reports every offending id.
pub fn check_permission_scope(
    role_type: RoleUserType,
    permissions: &[Permission],
) -> AppResult<()> {
    let offending: BTreeSet<String> = permissions
        .iter()
        .filter(|p| p.user_type != role_type)
        .map(|p| p.id.to_string())
        .collect();
    if offending.is_empty() {
        return Ok(());
    }
    Err(AppError::field(
        "permissionIds",
        format!(
            "Permissions not applicable to {} roles: {}",
            role_type,
            offending.into_iter().collect::<Vec<_>>().join(", ")
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn user(account_type: AccountType, is_super_admin: bool) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: "someone@vista.test".to_string(),
            account_type,
            is_super_admin,
        }
    }

    fn permission(name: &str, user_type: RoleUserType) -> Permission {
        let now = Utc::now();
        Permission {
            id: Uuid::new_v4(),
            category: name.split('.').next().unwrap_or(name).to_string(),
            name: name.to_string(),
            user_type,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn missing_is_the_set_difference() {
        let required = vec!["activity.create".to_string(), "activity.update".to_string()];
        let granted: HashSet<String> = ["activity.update".to_string()].into_iter().collect();
        assert_eq!(missing_permissions(&required, &granted), vec!["activity.create"]);
        assert!(missing_permissions(&[], &granted).is_empty());
    }

    #[test]
    fn content_policies_follow_the_managing_portal() {
        let guide = AccessPolicy::content(ContentKind::Guide, ContentAction::Delete);
        assert!(guide.admits(AccountType::Admin));
        assert!(!guide.admits(AccountType::Merchant));
        assert!(!guide.admits(AccountType::Customer));

        let homestay = AccessPolicy::content(ContentKind::Homestay, ContentAction::Update);
        assert_eq!(
            homestay.required_for(AccountType::Merchant),
            Some(&["homestay.update".to_string()][..])
        );
        assert_eq!(
            homestay.required_for(AccountType::Admin),
            Some(&["homestay.moderate".to_string()][..])
        );

        let verify = AccessPolicy::content(ContentKind::Homestay, ContentAction::Verify);
        assert!(!verify.admits(AccountType::Merchant));
    }

    #[test]
    fn super_admin_authority_over_system_roles() {
        let admin = user(AccountType::Admin, false);
        let root = user(AccountType::Admin, true);
        let merchant = user(AccountType::Merchant, false);

        assert!(ensure_can_manage_role_type(&admin, RoleUserType::System).is_err());
        assert!(ensure_can_manage_role_type(&root, RoleUserType::System).is_ok());
        assert!(ensure_can_manage_role_type(&merchant, RoleUserType::Admin).is_err());
        assert!(ensure_can_manage_role_type(&merchant, RoleUserType::Merchant).is_ok());
        assert!(ensure_can_manage_role_type(&admin, RoleUserType::Merchant).is_ok());
    }

    #[test]
    fn customers_hold_no_roles() {
        for role_type in [RoleUserType::System, RoleUserType::Admin, RoleUserType::Merchant] {
            assert!(!role_assignable(AccountType::Customer, role_type));
        }
        assert!(role_assignable(AccountType::Admin, RoleUserType::System));
        assert!(!role_assignable(AccountType::Merchant, RoleUserType::Admin));
    }

    #[test]
    fn scope_check_lists_offending_permissions() {
        let ok = permission("homestay.create", RoleUserType::Merchant);
        let bad = permission("role.create", RoleUserType::Admin);

        assert!(check_permission_scope(RoleUserType::Merchant, std::slice::from_ref(&ok)).is_ok());
        match check_permission_scope(RoleUserType::Merchant, &[ok, bad.clone()]) {
            Err(AppError::Validation(fields)) => {
                assert!(fields[0].message.contains(&bad.id.to_string()));
            }
            other => panic!("unexpected: {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn super_admin_bypasses_permissions_but_not_account_type() {
        let repo = crate::repository::InMemoryRepository::new();
        let policy = AccessPolicy::new().allow(AccountType::Admin, ["role.create"]);

        assert!(authorize(&repo, &user(AccountType::Admin, true), &policy).await.is_ok());
        assert!(matches!(
            authorize(&repo, &user(AccountType::Admin, false), &policy).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            authorize(&repo, &user(AccountType::Merchant, true), &policy).await,
            Err(AppError::Forbidden(_))
        ));
    }
}
