//! # Image sub-entities
//!
//! `ImageSetManager` handles the image collection of one content row: upload
//! and append, batch update, delete one, set featured. The owner must be live
//! and, for merchants, owned by the caller.

use uuid::Uuid;

use crate::{
    auth::AuthUser,
    dto::ImageBatchItem,
    error::{AppError, AppResult},
    lifecycle::ContentLifecycle,
    models::{ContentKind, Image, ImageChanges, ImageUpsert, NewImage},
    repository::{ImageStore, RepositoryState},
    storage::{StorageState, UploadedFile},
};

pub struct ImageSetManager {
    repo: RepositoryState,
    storage: StorageState,
    kind: ContentKind,
    owners: ContentLifecycle,
}

impl ImageSetManager {
    pub fn new(repo: RepositoryState, storage: StorageState, kind: ContentKind) -> Self {
        Self {
            owners: ContentLifecycle::new(repo.clone(), storage.clone(), kind),
            repo,
            storage,
            kind,
        }
    }

    fn check_files(&self, files: &[UploadedFile]) -> AppResult<()> {
        if files.is_empty() {
            return Err(AppError::field("images", "At least one image file is required"));
        }
        let cap = self.kind.max_image_bytes();
        for (index, file) in files.iter().enumerate() {
            let field = format!("images[{}]", index);
            if !file.content_type.starts_with("image/") {
                return Err(AppError::field(
                    field,
                    format!("{} is not an image ({})", file.file_name, file.content_type),
                ));
            }
            if file.bytes.is_empty() {
                return Err(AppError::field(field, format!("{} is empty", file.file_name)));
            }
            if file.bytes.len() > cap {
                return Err(AppError::field(
                    field,
                    format!(
                        "{} exceeds the {} MB limit",
                        file.file_name,
                        cap / (1024 * 1024)
                    ),
                ));
            }
        }
        Ok(())
    }

    async fn discard(&self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }
        if let Err(e) = self.storage.delete_many(keys).await {
            tracing::warn!(kind = ?self.kind, error = %e, "orphaned uploads left in storage");
        }
    }

    /// add
    ///
    /// Uploads every file, then inserts all rows in one transaction after the
    /// owner's existing images. Objects already uploaded are removed again,
    /// best effort, when a later upload or the insert fails.
    pub async fn add(
        &self,
        actor: &AuthUser,
        owner_id: Uuid,
        files: Vec<UploadedFile>,
    ) -> AppResult<Vec<Image>> {
        self.owners.load_for_mutation(actor, owner_id).await?;
        self.check_files(&files)?;

        let mut uploaded = Vec::with_capacity(files.len());
        for file in files {
            match self
                .storage
                .upload(file, self.kind.storage_category(), owner_id)
                .await
            {
                Ok(object) => uploaded.push(object),
                Err(e) => {
                    let keys: Vec<String> = uploaded.iter().map(|o| o.key.clone()).collect();
                    self.discard(&keys).await;
                    return Err(e.into());
                }
            }
        }

        let keys: Vec<String> = uploaded.iter().map(|o| o.key.clone()).collect();
        let rows = uploaded
            .into_iter()
            .map(|object| NewImage {
                image_url: object.url,
                storage_key: Some(object.key),
                file_name: Some(object.file_name),
                size: Some(object.size),
                mimetype: Some(object.mimetype),
                ..NewImage::default()
            })
            .collect();

        match self.repo.insert_images(self.kind, owner_id, rows).await {
            Ok(images) => {
                tracing::info!(
                    kind = ?self.kind,
                    owner = %owner_id,
                    count = images.len(),
                    "images added"
                );
                Ok(images)
            }
            Err(e) => {
                self.discard(&keys).await;
                Err(e)
            }
        }
    }

    /// update_batch
    ///
    /// Items with an `id` update that image; items without one are appended and
    /// need an `imageUrl`. All or nothing.
    pub async fn update_batch(
        &self,
        actor: &AuthUser,
        owner_id: Uuid,
        items: Vec<ImageBatchItem>,
    ) -> AppResult<Vec<Image>> {
        self.owners.load_for_mutation(actor, owner_id).await?;

        let mut batch = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            match item.id {
                Some(id) => batch.push(ImageUpsert::Update {
                    id,
                    changes: ImageChanges {
                        image_url: item.image_url,
                        caption: item.caption,
                        sort_order: item.sort_order,
                        is_featured: item.is_featured,
                    },
                }),
                None => {
                    let image_url = item.image_url.ok_or_else(|| {
                        AppError::field(
                            format!("images[{}].imageUrl", index),
                            "New images need an imageUrl",
                        )
                    })?;
                    batch.push(ImageUpsert::Insert(NewImage {
                        image_url,
                        caption: item.caption,
                        sort_order: item.sort_order,
                        is_featured: item.is_featured.unwrap_or(false),
                        ..NewImage::default()
                    }));
                }
            }
        }

        self.repo.apply_image_batch(self.kind, owner_id, batch).await
    }

    /// Removes the stored object first, then the row. A storage failure keeps
    /// the row, so its key is never lost.
    pub async fn delete_one(
        &self,
        actor: &AuthUser,
        owner_id: Uuid,
        image_id: Uuid,
    ) -> AppResult<()> {
        self.owners.load_for_mutation(actor, owner_id).await?;

        let image = self
            .repo
            .find_image(self.kind, owner_id, image_id)
            .await?
            .ok_or_else(|| AppError::not_found("Image not found"))?;

        if let Some(key) = image.storage_key.as_deref() {
            self.storage.delete(key).await.map_err(|e| {
                tracing::error!(
                    kind = ?self.kind,
                    image = %image_id,
                    error = %e,
                    "image object could not be removed; keeping the row"
                );
                AppError::from(e)
            })?;
        }

        if !self.repo.delete_image(self.kind, owner_id, image_id).await? {
            return Err(AppError::not_found("Image not found"));
        }
        Ok(())
    }

    /// Exactly one featured image per owner afterwards.
    pub async fn set_featured(
        &self,
        actor: &AuthUser,
        owner_id: Uuid,
        image_id: Uuid,
    ) -> AppResult<Image> {
        self.owners.load_for_mutation(actor, owner_id).await?;
        self.repo
            .set_featured_image(self.kind, owner_id, image_id)
            .await?
            .ok_or_else(|| AppError::not_found("Image not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccountType;
    use crate::repository::InMemoryRepository;
    use crate::storage::MockStorageService;
    use axum::body::Bytes;
    use std::sync::Arc;

    fn admin() -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: "admin@vista.test".to_string(),
            account_type: AccountType::Admin,
            is_super_admin: false,
        }
    }

    fn file(name: &str, content_type: &str, len: usize) -> UploadedFile {
        UploadedFile {
            file_name: name.to_string(),
            content_type: content_type.to_string(),
            bytes: Bytes::from(vec![7u8; len]),
        }
    }

    async fn setup(
        storage: MockStorageService,
    ) -> (ImageSetManager, ContentLifecycle, Uuid, MockStorageService) {
        let repo: RepositoryState = Arc::new(InMemoryRepository::new());
        let storage_state: StorageState = Arc::new(storage.clone());
        let lifecycle =
            ContentLifecycle::new(repo.clone(), storage_state.clone(), ContentKind::Guide);
        let req =
            serde_json::from_value(serde_json::json!({ "name": "Bako Trail Guide" })).unwrap();
        let owner = lifecycle.create(&admin(), req).await.unwrap();
        (
            ImageSetManager::new(repo, storage_state, ContentKind::Guide),
            lifecycle,
            owner.id,
            storage,
        )
    }

    #[tokio::test]
    async fn add_appends_in_order() {
        let (images, _, owner, storage) = setup(MockStorageService::new()).await;

        let first = images
            .add(&admin(), owner, vec![file("a.jpg", "image/jpeg", 10)])
            .await
            .unwrap();
        let more = images
            .add(
                &admin(),
                owner,
                vec![file("b.png", "image/png", 10), file("c.png", "image/png", 10)],
            )
            .await
            .unwrap();

        assert_eq!(first[0].sort_order, 0);
        let orders: Vec<i32> = more.iter().map(|i| i.sort_order).collect();
        assert_eq!(orders, vec![1, 2]);
        assert_eq!(storage.uploaded_keys().len(), 3);
        assert!(more.iter().all(|i| i.storage_key.is_some() && !i.is_featured));
    }

    #[tokio::test]
    async fn rejects_non_images_and_oversized_files() {
        let (images, _, owner, storage) = setup(MockStorageService::new()).await;

        let not_image = images
            .add(&admin(), owner, vec![file("notes.txt", "text/plain", 10)])
            .await;
        assert!(matches!(not_image, Err(AppError::Validation(_))));

        // Guides cap at 5 MB.
        let too_big = images
            .add(&admin(), owner, vec![file("big.jpg", "image/jpeg", 5 * 1024 * 1024 + 1)])
            .await;
        assert!(matches!(too_big, Err(AppError::Validation(_))));
        assert!(storage.uploaded_keys().is_empty());
    }

    #[tokio::test]
    async fn set_featured_leaves_exactly_one() {
        let (images, _, owner, _) = setup(MockStorageService::new()).await;
        let added = images
            .add(
                &admin(),
                owner,
                vec![
                    file("a.jpg", "image/jpeg", 1),
                    file("b.jpg", "image/jpeg", 1),
                    file("c.jpg", "image/jpeg", 1),
                ],
            )
            .await
            .unwrap();

        images.set_featured(&admin(), owner, added[0].id).await.unwrap();
        let featured = images.set_featured(&admin(), owner, added[2].id).await.unwrap();
        assert!(featured.is_featured);

        let all = images.repo.list_images(ContentKind::Guide, owner).await.unwrap();
        assert_eq!(all.iter().filter(|i| i.is_featured).count(), 1);
        assert_eq!(all[0].id, added[2].id);

        let foreign = images.set_featured(&admin(), owner, Uuid::new_v4()).await;
        assert!(matches!(foreign, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn batch_appends_need_a_url() {
        let (images, _, owner, _) = setup(MockStorageService::new()).await;
        let items: Vec<ImageBatchItem> =
            serde_json::from_value(serde_json::json!([{ "caption": "no url" }])).unwrap();

        match images.update_batch(&admin(), owner, items).await {
            Err(AppError::Validation(fields)) => assert_eq!(fields[0].field, "images[0].imageUrl"),
            other => panic!("unexpected: {:?}", other.map(|v| v.len())),
        }
    }

    #[tokio::test]
    async fn single_delete_keeps_the_row_when_storage_fails() {
        let (images, _, owner, _) = setup(MockStorageService::new()).await;
        let added = images
            .add(&admin(), owner, vec![file("a.jpg", "image/jpeg", 1)])
            .await
            .unwrap();

        let failing = MockStorageService::new_failing();
        let manager = ImageSetManager::new(
            images.repo.clone(),
            Arc::new(failing.clone()),
            ContentKind::Guide,
        );
        let result = manager.delete_one(&admin(), owner, added[0].id).await;

        assert!(matches!(result, Err(AppError::Storage(_))));
        assert_eq!(failing.delete_calls().len(), 1);
        let left = manager.repo.list_images(ContentKind::Guide, owner).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].storage_key, added[0].storage_key);
    }

    #[tokio::test]
    async fn deleted_owner_hides_its_image_set() {
        let (images, lifecycle, owner, _) = setup(MockStorageService::new()).await;
        lifecycle.soft_delete(&admin(), owner).await.unwrap();

        let result = images
            .add(&admin(), owner, vec![file("a.jpg", "image/jpeg", 1)])
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
