use axum::{
    Extension, Router,
    routing::{delete, get, patch, post, put},
};

use super::guarded;
use crate::{
    AppState,
    handlers::{content, images},
    models::{ContentAction, ContentKind},
    rbac::AccessPolicy,
};

/// Mounts every content collection at its path.
pub fn content_routes(state: &AppState) -> Router<AppState> {
    ContentKind::ALL
        .into_iter()
        .fold(Router::new(), |router, kind| {
            router.nest(kind.path(), collection_routes(state, kind))
        })
}

/// collection_routes
///
/// The lifecycle and image routes of one collection. Reads are public; every
/// write is gated by the kind's policy for the action it performs. Image edits
/// count as updates of their owner.
fn collection_routes(state: &AppState, kind: ContentKind) -> Router<AppState> {
    let policy = |action| AccessPolicy::content(kind, action);

    Router::new()
        // GET /  (public)   POST /  (create)
        .route(
            "/",
            get(content::list_content).merge(guarded(
                state,
                policy(ContentAction::Create),
                post(content::create_content),
            )),
        )
        // GET /deleted
        // Trash listing, visible to whoever may restore.
        .route(
            "/deleted",
            guarded(
                state,
                policy(ContentAction::Restore),
                get(content::list_deleted_content),
            ),
        )
        // GET /{id}  (public)   PUT /{id}  (update)   DELETE /{id}  (soft delete)
        .route(
            "/{id}",
            get(content::get_content)
                .merge(guarded(
                    state,
                    policy(ContentAction::Update),
                    put(content::update_content),
                ))
                .merge(guarded(
                    state,
                    policy(ContentAction::Delete),
                    delete(content::delete_content),
                )),
        )
        .route(
            "/restore/{id}",
            guarded(
                state,
                policy(ContentAction::Restore),
                patch(content::restore_content),
            ),
        )
        .route(
            "/status/{id}",
            guarded(
                state,
                policy(ContentAction::Update),
                patch(content::toggle_status),
            ),
        )
        .route(
            "/{id}/verify",
            guarded(
                state,
                policy(ContentAction::Verify),
                patch(content::toggle_verified),
            ),
        )
        // POST adds uploaded files; PUT and PATCH apply a JSON batch.
        .route(
            "/{id}/images",
            guarded(
                state,
                policy(ContentAction::Update),
                post(images::add_images)
                    .put(images::update_images)
                    .patch(images::update_images),
            ),
        )
        .route(
            "/{id}/images/{image_id}",
            guarded(
                state,
                policy(ContentAction::Update),
                delete(images::delete_image),
            ),
        )
        .route(
            "/{id}/images/{image_id}/featured",
            guarded(
                state,
                policy(ContentAction::Update),
                patch(images::set_featured_image),
            ),
        )
        .layer(Extension(kind))
}
