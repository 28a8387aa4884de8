use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use uuid::Uuid;

use super::{created, flag_value};
use crate::{
    AppState,
    auth::AuthUser,
    dto::{
        ApiResponse, AssignRolesRequest, CreateAdminRequest, FlagRequest, Pagination, UserQuery,
    },
    error::AppResult,
    models::{RoleWithPermissions, User},
    validation::ValidatedJson,
};

/// create_admin
///
/// [Gated Route] Creates an admin account with its profile in one transaction.
/// Only a super admin may set `isSuperAdmin`.
#[utoipa::path(
    post,
    path = "/admin/users",
    request_body = CreateAdminRequest,
    responses(
        (status = 201, description = "Admin created"),
        (status = 403, description = "Super-admin flag requires a super admin"),
        (status = 409, description = "Email already registered")
    ),
    tag = "users"
)]
pub async fn create_admin(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateAdminRequest>,
) -> AppResult<impl IntoResponse> {
    let registered = state.accounts().create_admin(&user, req).await?;
    Ok(created(registered, "Admin created"))
}

/// [Gated Route] Live users, newest first, optionally of one account type.
#[utoipa::path(
    get,
    path = "/admin/users",
    params(UserQuery),
    responses((status = 200, description = "One page of users", body = [User])),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<ApiResponse<Vec<User>>>> {
    let (page, number, limit) = state.roles().list_users(query).await?;
    Ok(Json(ApiResponse::paginated(
        page.items,
        Pagination::new(page.total, number, limit),
    )))
}

/// assign_roles
///
/// [Gated Route] Replaces the user's roles. Each role must suit the user's account
/// type (customers hold none) and lie within the caller's authority.
#[utoipa::path(
    put,
    path = "/admin/users/{id}/roles",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = AssignRolesRequest,
    responses(
        (
            status = 200,
            description = "The user's roles after the change",
            body = [RoleWithPermissions]
        ),
        (status = 400, description = "Role not assignable to this account type"),
        (status = 404, description = "User or role not found")
    ),
    tag = "users"
)]
pub async fn assign_roles(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<AssignRolesRequest>,
) -> AppResult<Json<ApiResponse<Vec<RoleWithPermissions>>>> {
    let roles = state.roles().assign_roles(&user, id, &req.role_ids).await?;
    Ok(Json(ApiResponse::with_message(roles, "Roles assigned")))
}

/// [Gated Route] Enables or disables an account; inverts without a value.
#[utoipa::path(
    patch,
    path = "/admin/users/{id}/status",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = FlagRequest,
    responses(
        (status = 200, description = "Status changed", body = User),
        (status = 400, description = "Cannot deactivate yourself")
    ),
    tag = "users"
)]
pub async fn set_user_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> AppResult<Json<ApiResponse<User>>> {
    let value = flag_value(&body)?;
    let updated = state.roles().set_user_status(&user, id, value).await?;
    Ok(Json(ApiResponse::success(updated)))
}
