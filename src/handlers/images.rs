use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use super::created;
use crate::{
    AppState,
    auth::AuthUser,
    dto::{ApiResponse, ImageBatchRequest},
    error::{AppError, AppResult},
    models::{ContentKind, Image},
    storage::UploadedFile,
    validation::ValidatedJson,
};

/// Multipart field carrying image files. Other fields are ignored.
const IMAGES_FIELD: &str = "images";

/// Buffers every `images` part of the form.
async fn read_images(mut multipart: Multipart) -> AppResult<Vec<UploadedFile>> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(e.body_text()))?
    {
        if field.name() != Some(IMAGES_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::bad_request(e.body_text()))?;
        files.push(UploadedFile {
            file_name,
            content_type,
            bytes,
        });
    }
    Ok(files)
}

/// add_images
///
/// [Gated Route] Uploads the `images` parts of a multipart form and appends them
/// after the row's existing images.
#[utoipa::path(
    post,
    path = "/{entity}/{id}/images",
    params(
        ("entity" = String, Path, description = "Collection"),
        ("id" = Uuid, Path, description = "Owner row ID")
    ),
    request_body(
        content_type = "multipart/form-data",
        description = "One or more `images` file parts"
    ),
    responses(
        (status = 201, description = "Images added", body = [Image]),
        (status = 400, description = "No files, not an image, or over the size cap"),
        (status = 404, description = "Owner absent or soft-deleted")
    ),
    tag = "images"
)]
pub async fn add_images(
    Extension(kind): Extension<ContentKind>,
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let files = read_images(multipart).await?;
    let images = state.images(kind).add(&user, id, files).await?;
    let message = format!("{} image(s) added", images.len());
    Ok(created(images, message))
}

/// update_images
///
/// [Gated Route] Batch edit in one transaction. Items with `id` update that
/// image; items without are appended and need `imageUrl`.
#[utoipa::path(
    put,
    path = "/{entity}/{id}/images",
    params(
        ("entity" = String, Path, description = "Collection"),
        ("id" = Uuid, Path, description = "Owner row ID")
    ),
    request_body = ImageBatchRequest,
    responses(
        (status = 200, description = "The owner's images after the batch", body = [Image]),
        (status = 404, description = "Owner or a referenced image not found")
    ),
    tag = "images"
)]
pub async fn update_images(
    Extension(kind): Extension<ContentKind>,
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<ImageBatchRequest>,
) -> AppResult<Json<ApiResponse<Vec<Image>>>> {
    let images = state.images(kind).update_batch(&user, id, req.images).await?;
    Ok(Json(ApiResponse::success(images)))
}

/// [Gated Route] Removes one image and its stored object.
#[utoipa::path(
    delete,
    path = "/{entity}/{id}/images/{imageId}",
    params(
        ("entity" = String, Path, description = "Collection"),
        ("id" = Uuid, Path, description = "Owner row ID"),
        ("imageId" = Uuid, Path, description = "Image ID")
    ),
    responses(
        (status = 200, description = "Image deleted"),
        (status = 404, description = "Owner or image not found"),
        (status = 500, description = "Stored object could not be removed; the image is kept")
    ),
    tag = "images"
)]
pub async fn delete_image(
    Extension(kind): Extension<ContentKind>,
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, image_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.images(kind).delete_one(&user, id, image_id).await?;
    Ok(Json(ApiResponse::message("Image deleted")))
}

/// [Gated Route] Makes the image the owner's only featured image.
#[utoipa::path(
    patch,
    path = "/{entity}/{id}/images/{imageId}/featured",
    params(
        ("entity" = String, Path, description = "Collection"),
        ("id" = Uuid, Path, description = "Owner row ID"),
        ("imageId" = Uuid, Path, description = "Image ID")
    ),
    responses(
        (status = 200, description = "Featured image set", body = Image),
        (status = 404, description = "Owner or image not found")
    ),
    tag = "images"
)]
pub async fn set_featured_image(
    Extension(kind): Extension<ContentKind>,
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, image_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<Image>>> {
    let image = state.images(kind).set_featured(&user, id, image_id).await?;
    Ok(Json(ApiResponse::with_message(image, "Featured image set")))
}
