use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    AccountType, ContentChanges, ContentEntity, ContentFilter, ContentFlag, ContentKind, Image,
    ImageUpsert, NewContent, NewImage, NewPermission, NewProfile, NewRole, NewUser, Permission,
    PermissionChanges, Profile, RoleChanges, RoleUserType, RoleWithPermissions, User,
    UserCredentials, Visibility,
};

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// One page of a listing plus the number of rows matching the filter.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// UserStore
///
/// Credential store and profile persistence. Emails are stored lowercased; the
/// lookups here expect already-normalized input.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts the user and its profile in one transaction.
    async fn create_user_with_profile(
        &self,
        user: NewUser,
        profile: NewProfile,
    ) -> AppResult<(User, Profile)>;

    async fn find_user(&self, id: Uuid, visibility: Visibility) -> AppResult<Option<User>>;

    /// Live users only. The only lookup that loads the password hash by email.
    async fn find_credentials_by_email(&self, email: &str) -> AppResult<Option<UserCredentials>>;

    async fn find_credentials(&self, id: Uuid) -> AppResult<Option<UserCredentials>>;

    // Soft-deleted users still hold their email.
    async fn email_taken(&self, email: &str) -> AppResult<bool>;

    async fn business_registration_taken(&self, number: &str) -> AppResult<bool>;

    async fn find_profile(&self, user: &User) -> AppResult<Option<Profile>>;

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: String,
        changed_at: DateTime<Utc>,
    ) -> AppResult<()>;

    async fn set_user_active(&self, id: Uuid, is_active: bool) -> AppResult<Option<User>>;

    async fn list_users(
        &self,
        account_type: Option<AccountType>,
        page: u64,
        limit: u64,
    ) -> AppResult<Page<User>>;
}

/// RbacStore
///
/// Roles, permissions and the two join tables. Writes that touch links run in a
/// transaction with the row they belong to.
#[async_trait]
pub trait RbacStore: Send + Sync {
    async fn create_role(&self, role: NewRole) -> AppResult<RoleWithPermissions>;
    async fn find_role(&self, id: Uuid) -> AppResult<Option<RoleWithPermissions>>;
    async fn role_name_taken(&self, name: &str, exclude: Option<Uuid>) -> AppResult<bool>;
    async fn list_roles(&self, user_type: Option<RoleUserType>)
    -> AppResult<Vec<RoleWithPermissions>>;
    async fn update_role(
        &self,
        id: Uuid,
        changes: RoleChanges,
    ) -> AppResult<Option<RoleWithPermissions>>;
    async fn delete_role(&self, id: Uuid) -> AppResult<bool>;

    async fn create_permission(&self, permission: NewPermission) -> AppResult<Permission>;
    async fn find_permission(&self, id: Uuid) -> AppResult<Option<Permission>>;
    async fn find_permissions(&self, ids: &[Uuid]) -> AppResult<Vec<Permission>>;
    async fn permission_name_taken(&self, name: &str, exclude: Option<Uuid>) -> AppResult<bool>;
    async fn list_permissions(&self, user_type: Option<RoleUserType>)
    -> AppResult<Vec<Permission>>;
    async fn update_permission(
        &self,
        id: Uuid,
        changes: PermissionChanges,
    ) -> AppResult<Option<Permission>>;
    async fn delete_permission(&self, id: Uuid) -> AppResult<bool>;

    /// Every role held by the user, each with its permissions.
    async fn user_roles(&self, user_id: Uuid) -> AppResult<Vec<RoleWithPermissions>>;
    /// Replaces the user's whole role set.
    async fn set_user_roles(&self, user_id: Uuid, role_ids: &[Uuid]) -> AppResult<()>;
}

/// ContentStore
///
/// Generic persistence for every content kind. Mutations only ever touch live
/// rows, except `set_deleted_at(.., None)` which only touches deleted ones.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn insert_content(&self, kind: ContentKind, content: NewContent)
    -> AppResult<ContentEntity>;

    async fn find_content(
        &self,
        kind: ContentKind,
        id: Uuid,
        visibility: Visibility,
    ) -> AppResult<Option<ContentEntity>>;

    /// True when a live row other than `exclude` already uses `slug`.
    async fn slug_in_use(
        &self,
        kind: ContentKind,
        slug: &str,
        exclude: Option<Uuid>,
    ) -> AppResult<bool>;

    async fn list_content(
        &self,
        kind: ContentKind,
        filter: &ContentFilter,
        visibility: Visibility,
    ) -> AppResult<Page<ContentEntity>>;

    async fn update_content(
        &self,
        kind: ContentKind,
        id: Uuid,
        changes: ContentChanges,
    ) -> AppResult<Option<ContentEntity>>;

    /// `Some` soft-deletes a live row, `None` restores a deleted one.
    async fn set_deleted_at(
        &self,
        kind: ContentKind,
        id: Uuid,
        deleted_at: Option<DateTime<Utc>>,
    ) -> AppResult<Option<ContentEntity>>;

    async fn set_flag(
        &self,
        kind: ContentKind,
        id: Uuid,
        flag: ContentFlag,
        value: bool,
    ) -> AppResult<Option<ContentEntity>>;
}

/// ImageStore
///
/// Image rows of every kind. Every write that can change which image is
/// featured leaves at most one featured row per owner.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Featured first, then sort order, then age.
    async fn list_images(&self, kind: ContentKind, owner_id: Uuid) -> AppResult<Vec<Image>>;

    async fn find_image(
        &self,
        kind: ContentKind,
        owner_id: Uuid,
        image_id: Uuid,
    ) -> AppResult<Option<Image>>;

    /// Appends all images in one transaction after the owner's current last image.
    async fn insert_images(
        &self,
        kind: ContentKind,
        owner_id: Uuid,
        images: Vec<NewImage>,
    ) -> AppResult<Vec<Image>>;

    /// Applies the batch in one transaction. An update naming an image the owner
    /// does not have fails the whole batch with `NotFound`.
    async fn apply_image_batch(
        &self,
        kind: ContentKind,
        owner_id: Uuid,
        batch: Vec<ImageUpsert>,
    ) -> AppResult<Vec<Image>>;

    async fn delete_image(&self, kind: ContentKind, owner_id: Uuid, image_id: Uuid)
    -> AppResult<bool>;

    /// Makes `image_id` the owner's only featured image. `None` when the owner has no such image.
    async fn set_featured_image(
        &self,
        kind: ContentKind,
        owner_id: Uuid,
        image_id: Uuid,
    ) -> AppResult<Option<Image>>;
}

/// Repository
///
/// The full persistence contract held in the application state. Implemented
/// for anything that implements the four stores.
pub trait Repository: UserStore + RbacStore + ContentStore + ImageStore {}

impl<T> Repository for T where T: UserStore + RbacStore + ContentStore + ImageStore {}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// Pages are 1-based; `limit` is already clamped by the caller.
pub(crate) fn page_offset(page: u64, limit: u64) -> u64 {
    page.saturating_sub(1).saturating_mul(limit)
}
