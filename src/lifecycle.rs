//! # Content lifecycle
//!
//! Create, update, soft delete, restore and toggle for every content kind,
//! parameterized by `ContentKind`. Validation and ownership checks run before
//! any write.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    dto::{ContentQuery, CreateContentRequest, UpdateContentRequest, paging},
    error::{AppError, AppResult},
    models::{
        AccountType, ContentChanges, ContentEntity, ContentFilter, ContentFlag, ContentKind,
        ContentWithImages, NewContent, Visibility,
    },
    repository::{ContentStore, ImageStore, Page, RepositoryState},
    storage::StorageState,
    validation::{ensure_slug_available, resolve_slug},
};

/// Merchants may only act on rows they created; admins on any row.
pub fn ensure_owner(actor: &AuthUser, entity: &ContentEntity) -> AppResult<()> {
    match actor.account_type {
        AccountType::Admin => Ok(()),
        AccountType::Merchant if entity.owner_id == Some(actor.id) => Ok(()),
        _ => Err(AppError::forbidden("You can only manage your own listings")),
    }
}

fn ensure_object(details: &Value) -> AppResult<()> {
    if details.is_object() {
        Ok(())
    } else {
        Err(AppError::field("details", "Details must be a JSON object"))
    }
}

fn clean(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string())
}

/// ContentLifecycle
///
/// The lifecycle manager of one content kind. Cheap to construct per request.
#[derive(Clone)]
pub struct ContentLifecycle {
    repo: RepositoryState,
    storage: StorageState,
    kind: ContentKind,
}

impl ContentLifecycle {
    pub fn new(repo: RepositoryState, storage: StorageState, kind: ContentKind) -> Self {
        Self {
            repo,
            storage,
            kind,
        }
    }

    fn not_found(&self) -> AppError {
        AppError::not_found(format!("{} not found", self.kind.label()))
    }

    /// A live row the actor may mutate: 404 when absent or soft-deleted, 403 when
    /// a merchant does not own it.
    pub async fn load_for_mutation(&self, actor: &AuthUser, id: Uuid) -> AppResult<ContentEntity> {
        let entity = self
            .repo
            .find_content(self.kind, id, Visibility::Live)
            .await?
            .ok_or_else(|| self.not_found())?;
        ensure_owner(actor, &entity)?;
        Ok(entity)
    }

    pub async fn create(
        &self,
        actor: &AuthUser,
        req: CreateContentRequest,
    ) -> AppResult<ContentEntity> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::field("name", "Name is required"));
        }
        let slug = resolve_slug(&name, req.slug.as_deref())?;
        let details = req.details.unwrap_or_else(|| Value::Object(Default::default()));
        ensure_object(&details)?;

        ensure_slug_available(self.repo.as_ref(), self.kind, &slug, None).await?;

        let owner_id = (actor.account_type == AccountType::Merchant).then_some(actor.id);
        let created = self
            .repo
            .insert_content(
                self.kind,
                NewContent {
                    name,
                    slug,
                    description: clean(req.description),
                    city: clean(req.city),
                    details,
                    owner_id,
                    is_active: req.is_active.unwrap_or(true),
                },
            )
            .await?;

        tracing::info!(
            kind = ?self.kind,
            id = %created.id,
            slug = %created.slug,
            "content created"
        );
        Ok(created)
    }

    /// update
    ///
    /// Partial update. The slug follows the name only when the name actually
    /// changes and no explicit slug is given.
    pub async fn update(
        &self,
        actor: &AuthUser,
        id: Uuid,
        req: UpdateContentRequest,
    ) -> AppResult<ContentEntity> {
        let current = self.load_for_mutation(actor, id).await?;

        let name = clean(req.name);
        if name.as_deref() == Some("") {
            return Err(AppError::field("name", "Name is required"));
        }
        if let Some(details) = &req.details {
            ensure_object(details)?;
        }

        let explicit_slug = req.slug.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let slug = match (explicit_slug, name.as_deref()) {
            (Some(explicit), _) => Some(resolve_slug(&current.name, Some(explicit))?),
            (None, Some(new_name)) if new_name != current.name => {
                Some(resolve_slug(new_name, None)?)
            }
            _ => None,
        }
        .filter(|slug| *slug != current.slug);

        if let Some(slug) = &slug {
            ensure_slug_available(self.repo.as_ref(), self.kind, slug, Some(id)).await?;
        }

        let changes = ContentChanges {
            name,
            slug,
            description: clean(req.description),
            city: clean(req.city),
            details: req.details,
            is_active: req.is_active,
        };

        self.repo
            .update_content(self.kind, id, changes)
            .await?
            .ok_or_else(|| self.not_found())
    }

    /// soft_delete
    ///
    /// Removes every stored object behind the row's images (one storage call per
    /// key), then marks the row deleted. Storage failures are logged and do not
    /// block the delete.
    pub async fn soft_delete(&self, actor: &AuthUser, id: Uuid) -> AppResult<ContentEntity> {
        self.load_for_mutation(actor, id).await?;

        let keys: Vec<String> = self
            .repo
            .list_images(self.kind, id)
            .await?
            .into_iter()
            .filter_map(|image| image.storage_key)
            .collect();

        if !keys.is_empty() {
            if let Err(e) = self.storage.delete_many(&keys).await {
                tracing::warn!(
                    kind = ?self.kind,
                    id = %id,
                    error = %e,
                    "image objects could not be removed; continuing with delete"
                );
            }
        }

        let deleted = self
            .repo
            .set_deleted_at(self.kind, id, Some(Utc::now()))
            .await?
            .ok_or_else(|| self.not_found())?;

        tracing::info!(kind = ?self.kind, id = %id, images = keys.len(), "content soft-deleted");
        Ok(deleted)
    }

    /// restore
    ///
    /// Only a soft-deleted row can be restored, and only while no live row has
    /// taken its slug in the meantime.
    pub async fn restore(&self, actor: &AuthUser, id: Uuid) -> AppResult<ContentEntity> {
        let entity = self
            .repo
            .find_content(self.kind, id, Visibility::All)
            .await?
            .ok_or_else(|| self.not_found())?;
        ensure_owner(actor, &entity)?;

        if entity.deleted_at.is_none() {
            return Err(AppError::bad_request(format!(
                "{} is not deleted",
                self.kind.label()
            )));
        }

        ensure_slug_available(self.repo.as_ref(), self.kind, &entity.slug, Some(id)).await?;

        let restored = self
            .repo
            .set_deleted_at(self.kind, id, None)
            .await?
            .ok_or_else(|| self.not_found())?;

        tracing::info!(kind = ?self.kind, id = %id, "content restored");
        Ok(restored)
    }

    /// Sets `flag` to `value`, or inverts it when no value is given.
    pub async fn toggle(
        &self,
        actor: &AuthUser,
        id: Uuid,
        flag: ContentFlag,
        value: Option<bool>,
    ) -> AppResult<ContentEntity> {
        let current = self.load_for_mutation(actor, id).await?;
        let current_value = match flag {
            ContentFlag::Active => current.is_active,
            ContentFlag::Verified => current.vista_verified,
        };
        self.repo
            .set_flag(self.kind, id, flag, value.unwrap_or(!current_value))
            .await?
            .ok_or_else(|| self.not_found())
    }

    /// A live row with its images, featured first.
    pub async fn get(&self, id: Uuid) -> AppResult<ContentWithImages> {
        let entity = self
            .repo
            .find_content(self.kind, id, Visibility::Live)
            .await?
            .ok_or_else(|| self.not_found())?;
        let images = self.repo.list_images(self.kind, id).await?;
        Ok(ContentWithImages { entity, images })
    }

    pub async fn list(&self, query: ContentQuery) -> AppResult<(Page<ContentEntity>, u64, u64)> {
        self.list_scoped(query, None, Visibility::Live).await
    }

    /// Soft-deleted rows only. Merchants see their own.
    pub async fn list_deleted(
        &self,
        actor: &AuthUser,
        query: ContentQuery,
    ) -> AppResult<(Page<ContentEntity>, u64, u64)> {
        let owner = (actor.account_type == AccountType::Merchant).then_some(actor.id);
        self.list_scoped(query, owner, Visibility::Deleted).await
    }

    async fn list_scoped(
        &self,
        query: ContentQuery,
        owner_id: Option<Uuid>,
        visibility: Visibility,
    ) -> AppResult<(Page<ContentEntity>, u64, u64)> {
        let (page, limit) = paging(query.page, query.limit);
        let filter = ContentFilter {
            is_active: query.is_active,
            vista_verified: query.vista_verified,
            city: clean(query.city).filter(|c| !c.is_empty()),
            search: clean(query.search).filter(|s| !s.is_empty()),
            owner_id,
            page,
            limit,
        };
        let result = self.repo.list_content(self.kind, &filter, visibility).await?;
        Ok((result, page, limit))
    }
}
