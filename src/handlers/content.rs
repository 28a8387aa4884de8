use axum::{
    Extension, Json,
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
        ApiResponse, ContentQuery, CreateContentRequest, FlagRequest, Pagination,
        UpdateContentRequest,
    },
    error::AppResult,
    models::{ContentEntity, ContentFlag, ContentKind, ContentWithImages},
    validation::ValidatedJson,
};

/// create_content
///
/// [Gated Route] Creates a row of the collection the router is mounted for.
/// The slug is derived from `name` (or its alias `title`) unless given, and must
/// be unique among live rows. A merchant becomes the row's owner.
#[utoipa::path(
    post,
    path = "/{entity}",
    params(("entity" = String, Path, description = "Collection, e.g. activities")),
    request_body = CreateContentRequest,
    responses(
        (status = 201, description = "Created", body = ContentEntity),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Slug already in use")
    ),
    tag = "content"
)]
pub async fn create_content(
    Extension(kind): Extension<ContentKind>,
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateContentRequest>,
) -> AppResult<impl IntoResponse> {
    let entity = state.lifecycle(kind).create(&user, req).await?;
    Ok(created(entity, format!("{} created", kind.label())))
}

/// list_content
///
/// [Public Route] Live rows only, newest first, with optional filters.
#[utoipa::path(
    get,
    path = "/{entity}",
    params(("entity" = String, Path, description = "Collection"), ContentQuery),
    responses((status = 200, description = "One page of live rows", body = [ContentEntity])),
    tag = "content"
)]
pub async fn list_content(
    Extension(kind): Extension<ContentKind>,
    State(state): State<AppState>,
    Query(query): Query<ContentQuery>,
) -> AppResult<Json<ApiResponse<Vec<ContentEntity>>>> {
    let (page, number, limit) = state.lifecycle(kind).list(query).await?;
    Ok(Json(ApiResponse::paginated(
        page.items,
        Pagination::new(page.total, number, limit),
    )))
}

/// [Gated Route] The trash: soft-deleted rows only. Merchants see their own.
#[utoipa::path(
    get,
    path = "/{entity}/deleted",
    params(("entity" = String, Path, description = "Collection"), ContentQuery),
    responses((status = 200, description = "One page of deleted rows", body = [ContentEntity])),
    tag = "content"
)]
pub async fn list_deleted_content(
    Extension(kind): Extension<ContentKind>,
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ContentQuery>,
) -> AppResult<Json<ApiResponse<Vec<ContentEntity>>>> {
    let (page, number, limit) = state.lifecycle(kind).list_deleted(&user, query).await?;
    Ok(Json(ApiResponse::paginated(
        page.items,
        Pagination::new(page.total, number, limit),
    )))
}

/// [Public Route] A live row with its images, featured first.
#[utoipa::path(
    get,
    path = "/{entity}/{id}",
    params(
        ("entity" = String, Path, description = "Collection"),
        ("id" = Uuid, Path, description = "Row ID")
    ),
    responses(
        (status = 200, description = "Found", body = ContentWithImages),
        (status = 404, description = "Absent or soft-deleted")
    ),
    tag = "content"
)]
pub async fn get_content(
    Extension(kind): Extension<ContentKind>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ContentWithImages>>> {
    Ok(Json(ApiResponse::success(state.lifecycle(kind).get(id).await?)))
}

/// update_content
///
/// [Gated Route] Partial update. Renaming without an explicit slug regenerates it.
#[utoipa::path(
    put,
    path = "/{entity}/{id}",
    params(
        ("entity" = String, Path, description = "Collection"),
        ("id" = Uuid, Path, description = "Row ID")
    ),
    request_body = UpdateContentRequest,
    responses(
        (status = 200, description = "Updated", body = ContentEntity),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Absent or soft-deleted"),
        (status = 409, description = "Slug already in use")
    ),
    tag = "content"
)]
pub async fn update_content(
    Extension(kind): Extension<ContentKind>,
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateContentRequest>,
) -> AppResult<Json<ApiResponse<ContentEntity>>> {
    let entity = state.lifecycle(kind).update(&user, id, req).await?;
    Ok(Json(ApiResponse::with_message(
        entity,
        format!("{} updated", kind.label()),
    )))
}

/// delete_content
///
/// [Gated Route] Soft delete. Stored image objects are removed first; a storage
/// failure is logged and does not block the delete.
#[utoipa::path(
    delete,
    path = "/{entity}/{id}",
    params(
        ("entity" = String, Path, description = "Collection"),
        ("id" = Uuid, Path, description = "Row ID")
    ),
    responses(
        (status = 200, description = "Soft-deleted", body = ContentEntity),
        (status = 404, description = "Absent or already deleted")
    ),
    tag = "content"
)]
pub async fn delete_content(
    Extension(kind): Extension<ContentKind>,
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ContentEntity>>> {
    let entity = state.lifecycle(kind).soft_delete(&user, id).await?;
    Ok(Json(ApiResponse::with_message(
        entity,
        format!("{} deleted", kind.label()),
    )))
}

/// [Gated Route] Brings a soft-deleted row back, provided its slug is still free.
#[utoipa::path(
    patch,
    path = "/{entity}/restore/{id}",
    params(
        ("entity" = String, Path, description = "Collection"),
        ("id" = Uuid, Path, description = "Row ID")
    ),
    responses(
        (status = 200, description = "Restored", body = ContentEntity),
        (status = 400, description = "Not deleted"),
        (status = 404, description = "Absent"),
        (status = 409, description = "Slug taken in the meantime")
    ),
    tag = "content"
)]
pub async fn restore_content(
    Extension(kind): Extension<ContentKind>,
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ContentEntity>>> {
    let entity = state.lifecycle(kind).restore(&user, id).await?;
    Ok(Json(ApiResponse::with_message(
        entity,
        format!("{} restored", kind.label()),
    )))
}

/// [Gated Route] Sets `isActive`, or inverts it when the body carries no value.
#[utoipa::path(
    patch,
    path = "/{entity}/status/{id}",
    params(
        ("entity" = String, Path, description = "Collection"),
        ("id" = Uuid, Path, description = "Row ID")
    ),
    request_body = FlagRequest,
    responses((status = 200, description = "Status changed", body = ContentEntity)),
    tag = "content"
)]
pub async fn toggle_status(
    Extension(kind): Extension<ContentKind>,
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> AppResult<Json<ApiResponse<ContentEntity>>> {
    let value = flag_value(&body)?;
    let entity = state
        .lifecycle(kind)
        .toggle(&user, id, ContentFlag::Active, value)
        .await?;
    Ok(Json(ApiResponse::success(entity)))
}

/// [Gated Route, admin only] Sets `vistaVerified`, or inverts it.
#[utoipa::path(
    patch,
    path = "/{entity}/{id}/verify",
    params(
        ("entity" = String, Path, description = "Collection"),
        ("id" = Uuid, Path, description = "Row ID")
    ),
    request_body = FlagRequest,
    responses((status = 200, description = "Verification changed", body = ContentEntity)),
    tag = "content"
)]
pub async fn toggle_verified(
    Extension(kind): Extension<ContentKind>,
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> AppResult<Json<ApiResponse<ContentEntity>>> {
    let value = flag_value(&body)?;
    let entity = state
        .lifecycle(kind)
        .toggle(&user, id, ContentFlag::Verified, value)
        .await?;
    Ok(Json(ApiResponse::success(entity)))
}
