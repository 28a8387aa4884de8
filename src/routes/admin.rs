use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};

use super::guarded;
use crate::{
    AppState,
    handlers::{rbac, users},
    models::AccountType,
    rbac::AccessPolicy,
};

fn admin(permission: &str) -> AccessPolicy {
    AccessPolicy::new().allow(AccountType::Admin, [permission])
}

/// Role routes admit admins through `role.*` and merchants through
/// `merchant_role.*`; the service then limits merchants to merchant roles.
fn role_policy(action: &str) -> AccessPolicy {
    AccessPolicy::new()
        .allow(AccountType::Admin, [format!("role.{}", action)])
        .allow(AccountType::Merchant, [format!("merchant_role.{}", action)])
}

/// Admin Router Module
///
/// Role and permission management plus account administration.
pub fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // --- Roles ---
        .route(
            "/roles",
            guarded(state, role_policy("create"), post(rbac::create_role))
                .merge(guarded(state, role_policy("read"), get(rbac::list_roles))),
        )
        .route(
            "/roles/{id}",
            guarded(state, role_policy("read"), get(rbac::get_role))
                .merge(guarded(state, role_policy("update"), put(rbac::update_role)))
                .merge(guarded(state, role_policy("delete"), delete(rbac::delete_role))),
        )
        // --- Permissions ---
        // Merchants may read the catalog to compose their roles.
        .route(
            "/permissions",
            guarded(state, admin("permission.create"), post(rbac::create_permission)).merge(
                guarded(
                    state,
                    AccessPolicy::new()
                        .allow(AccountType::Admin, ["permission.read"])
                        .allow(AccountType::Merchant, ["merchant_role.read"]),
                    get(rbac::list_permissions),
                ),
            ),
        )
        .route(
            "/permissions/{id}",
            guarded(state, admin("permission.read"), get(rbac::get_permission))
                .merge(guarded(
                    state,
                    admin("permission.update"),
                    put(rbac::update_permission),
                ))
                .merge(guarded(
                    state,
                    admin("permission.delete"),
                    delete(rbac::delete_permission),
                )),
        )
        // --- Accounts ---
        .route(
            "/admin/users",
            guarded(state, admin("user.create"), post(users::create_admin))
                .merge(guarded(state, admin("user.read"), get(users::list_users))),
        )
        .route(
            "/admin/users/{id}/roles",
            guarded(state, admin("user.update"), put(users::assign_roles)),
        )
        .route(
            "/admin/users/{id}/status",
            guarded(state, admin("user.update"), patch(users::set_user_status)),
        )
}
