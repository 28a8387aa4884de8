use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use uuid::Uuid;

use super::created;
use crate::{
    AppState,
    auth::AuthUser,
    dto::{
        ApiResponse, CreatePermissionRequest, CreateRoleRequest, UpdatePermissionRequest,
        UpdateRoleRequest, UserTypeQuery,
    },
    error::AppResult,
    models::{Permission, RoleWithPermissions},
    validation::ValidatedJson,
};

// --- Roles ---

/// create_role
///
/// [Gated Route] Creates a role with an initial permission set. The caller's
/// authority over the role's scope is checked before anything is read or written:
/// `system` roles need a super admin, `admin` roles an admin account.
#[utoipa::path(
    post,
    path = "/roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created", body = RoleWithPermissions),
        (status = 400, description = "Permission of another scope"),
        (status = 403, description = "Scope outside the caller's authority"),
        (status = 404, description = "Unknown permission ID"),
        (status = 409, description = "Role name taken")
    ),
    tag = "rbac"
)]
pub async fn create_role(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateRoleRequest>,
) -> AppResult<impl IntoResponse> {
    let role = state.roles().create_role(&user, req).await?;
    Ok(created(role, "Role created"))
}

/// [Gated Route] Roles with their permissions. Merchants see merchant roles only.
#[utoipa::path(
    get,
    path = "/roles",
    params(UserTypeQuery),
    responses((status = 200, description = "Roles", body = [RoleWithPermissions])),
    tag = "rbac"
)]
pub async fn list_roles(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<UserTypeQuery>,
) -> AppResult<Json<ApiResponse<Vec<RoleWithPermissions>>>> {
    let roles = state.roles().list_roles(&user, query.user_type).await?;
    Ok(Json(ApiResponse::success(roles)))
}

#[utoipa::path(
    get,
    path = "/roles/{id}",
    params(("id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Role", body = RoleWithPermissions),
        (status = 404, description = "Not found")
    ),
    tag = "rbac"
)]
pub async fn get_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<RoleWithPermissions>>> {
    Ok(Json(ApiResponse::success(
        state.roles().get_role(&user, id).await?,
    )))
}

/// [Gated Route] Renames a role or replaces its permission set.
#[utoipa::path(
    put,
    path = "/roles/{id}",
    params(("id" = Uuid, Path, description = "Role ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = RoleWithPermissions),
        (status = 403, description = "Scope outside the caller's authority"),
        (status = 404, description = "Not found")
    ),
    tag = "rbac"
)]
pub async fn update_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateRoleRequest>,
) -> AppResult<Json<ApiResponse<RoleWithPermissions>>> {
    let role = state.roles().update_role(&user, id, req).await?;
    Ok(Json(ApiResponse::with_message(role, "Role updated")))
}

#[utoipa::path(
    delete,
    path = "/roles/{id}",
    params(("id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Role deleted"),
        (status = 403, description = "Scope outside the caller's authority"),
        (status = 404, description = "Not found")
    ),
    tag = "rbac"
)]
pub async fn delete_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.roles().delete_role(&user, id).await?;
    Ok(Json(ApiResponse::message("Role deleted")))
}

// --- Permissions ---

#[utoipa::path(
    post,
    path = "/permissions",
    request_body = CreatePermissionRequest,
    responses(
        (status = 201, description = "Permission created", body = Permission),
        (status = 409, description = "Permission name taken")
    ),
    tag = "rbac"
)]
pub async fn create_permission(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreatePermissionRequest>,
) -> AppResult<impl IntoResponse> {
    let permission = state.roles().create_permission(req).await?;
    Ok(created(permission, "Permission created"))
}

/// [Gated Route] The permission catalog. Merchants see merchant permissions only.
#[utoipa::path(
    get,
    path = "/permissions",
    params(UserTypeQuery),
    responses((status = 200, description = "Permissions", body = [Permission])),
    tag = "rbac"
)]
pub async fn list_permissions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<UserTypeQuery>,
) -> AppResult<Json<ApiResponse<Vec<Permission>>>> {
    let permissions = state.roles().list_permissions(&user, query.user_type).await?;
    Ok(Json(ApiResponse::success(permissions)))
}

#[utoipa::path(
    get,
    path = "/permissions/{id}",
    params(("id" = Uuid, Path, description = "Permission ID")),
    responses(
        (status = 200, description = "Permission", body = Permission),
        (status = 404, description = "Not found")
    ),
    tag = "rbac"
)]
pub async fn get_permission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Permission>>> {
    Ok(Json(ApiResponse::success(
        state.roles().get_permission(id).await?,
    )))
}

#[utoipa::path(
    put,
    path = "/permissions/{id}",
    params(("id" = Uuid, Path, description = "Permission ID")),
    request_body = UpdatePermissionRequest,
    responses(
        (status = 200, description = "Permission updated", body = Permission),
        (status = 404, description = "Not found"),
        (status = 409, description = "Permission name taken")
    ),
    tag = "rbac"
)]
pub async fn update_permission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdatePermissionRequest>,
) -> AppResult<Json<ApiResponse<Permission>>> {
    let permission = state.roles().update_permission(id, req).await?;
    Ok(Json(ApiResponse::with_message(permission, "Permission updated")))
}

/// [Gated Route] Deletes a permission and unlinks it from every role.
#[utoipa::path(
    delete,
    path = "/permissions/{id}",
    params(("id" = Uuid, Path, description = "Permission ID")),
    responses(
        (status = 200, description = "Permission deleted"),
        (status = 404, description = "Not found")
    ),
    tag = "rbac"
)]
pub async fn delete_permission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.roles().delete_permission(id).await?;
    Ok(Json(ApiResponse::message("Permission deleted")))
}
