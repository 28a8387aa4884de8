use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ContentStore, ImageStore, Page, RbacStore, UserStore, page_offset};
use crate::error::{AppError, AppResult};
use crate::models::{
    AccountType, AdminProfile, ContentChanges, ContentEntity, ContentFilter, ContentFlag,
    ContentKind, CustomerProfile, Image, ImageUpsert, MerchantProfile, NewContent, NewImage,
    NewPermission, NewProfile, NewRole, NewUser, Permission, PermissionChanges, Profile, Role,
    RoleChanges, RoleUserType, RoleWithPermissions, User, UserCredentials, Visibility, sort_images,
};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, UserCredentials>,
    profiles: HashMap<Uuid, Profile>,
    roles: HashMap<Uuid, Role>,
    permissions: HashMap<Uuid, Permission>,
    // (role_id, permission_id)
    role_permissions: BTreeSet<(Uuid, Uuid)>,
    // (user_id, role_id)
    user_roles: BTreeSet<(Uuid, Uuid)>,
    content: HashMap<ContentKind, Vec<ContentEntity>>,
    images: HashMap<ContentKind, Vec<Image>>,
}

impl State {
    fn role_with_permissions(&self, role: &Role) -> RoleWithPermissions {
        let mut permissions: Vec<Permission> = self
            .role_permissions
            .iter()
            .filter(|(role_id, _)| *role_id == role.id)
            .filter_map(|(_, permission_id)| self.permissions.get(permission_id).cloned())
            .collect();
        permissions.sort_by(|a, b| (&a.category, &a.name).cmp(&(&b.category, &b.name)));
        RoleWithPermissions {
            role: role.clone(),
            permissions,
        }
    }

    fn slug_taken(&self, kind: ContentKind, slug: &str, exclude: Option<Uuid>) -> bool {
        self.content.get(&kind).is_some_and(|rows| {
            rows.iter().any(|row| {
                row.deleted_at.is_none() && row.slug == slug && Some(row.id) != exclude
            })
        })
    }

    fn content_mut(&mut self, kind: ContentKind, id: Uuid) -> Option<&mut ContentEntity> {
        self.content
            .get_mut(&kind)
            .and_then(|rows| rows.iter_mut().find(|row| row.id == id))
    }

    fn feature_only(&mut self, kind: ContentKind, owner_id: Uuid, image_id: Uuid) {
        let now = Utc::now();
        for image in self
            .images
            .entry(kind)
            .or_default()
            .iter_mut()
            .filter(|image| image.owner_id == owner_id)
        {
            let featured = image.id == image_id;
            if image.is_featured != featured {
                image.is_featured = featured;
                image.updated_at = now;
            }
        }
    }

    fn owner_images(&self, kind: ContentKind, owner_id: Uuid) -> Vec<Image> {
        let mut images: Vec<Image> = self
            .images
            .get(&kind)
            .map(|rows| {
                rows.iter()
                    .filter(|image| image.owner_id == owner_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        sort_images(&mut images);
        images
    }
}

/// InMemoryRepository
///
/// Lock-guarded implementation of every store, used by the integration tests
/// and for running the API without a database. Mirrors the unique constraints
/// of the schema (email, business registration number, live slug, role and
/// permission names) by returning `Conflict`. Every operation holds the lock
/// for its whole duration, which stands in for the database transactions.
#[derive(Default)]
pub struct InMemoryRepository {
    state: RwLock<State>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn conflict(what: &str) -> AppError {
    AppError::conflict(format!("{} already exists", what))
}

fn matches_filter(row: &ContentEntity, filter: &ContentFilter, visibility: Visibility) -> bool {
    if !visibility.admits(row.deleted_at) {
        return false;
    }
    if filter.is_active.is_some_and(|active| row.is_active != active) {
        return false;
    }
    if filter
        .vista_verified
        .is_some_and(|verified| row.vista_verified != verified)
    {
        return false;
    }
    if let Some(city) = &filter.city {
        if !row
            .city
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(city))
        {
            return false;
        }
    }
    if filter.owner_id.is_some() && row.owner_id != filter.owner_id {
        return false;
    }
    if let Some(search) = &filter.search {
        let needle = search.to_lowercase();
        let in_name = row.name.to_lowercase().contains(&needle);
        let in_description = row
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(&needle));
        if !in_name && !in_description {
            return false;
        }
    }
    true
}

#[async_trait]
impl UserStore for InMemoryRepository {
    async fn create_user_with_profile(
        &self,
        user: NewUser,
        profile: NewProfile,
    ) -> AppResult<(User, Profile)> {
        let mut state = self.state.write().await;

        if state.users.values().any(|c| c.user.email == user.email) {
            return Err(conflict("A user with this email"));
        }
        if let NewProfile::Merchant {
            business_registration_number,
            ..
        } = &profile
        {
            let taken = state.profiles.values().any(|p| {
                matches!(p, Profile::Merchant(m)
                    if &m.business_registration_number == business_registration_number)
            });
            if taken {
                return Err(conflict("A merchant with this business registration number"));
            }
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            account_type: user.account_type,
            is_active: true,
            is_super_admin: user.is_super_admin,
            last_password_change: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let profile = match profile {
            NewProfile::Admin { full_name } => Profile::Admin(AdminProfile {
                id: Uuid::new_v4(),
                user_id: created.id,
                full_name,
                created_at: now,
                updated_at: now,
            }),
            NewProfile::Merchant {
                business_name,
                business_registration_number,
                mobile_number,
            } => Profile::Merchant(MerchantProfile {
                id: Uuid::new_v4(),
                user_id: created.id,
                business_name,
                business_registration_number,
                mobile_number,
                created_at: now,
                updated_at: now,
            }),
            NewProfile::Customer {
                full_name,
                mobile_number,
            } => Profile::Customer(CustomerProfile {
                id: Uuid::new_v4(),
                user_id: created.id,
                full_name,
                mobile_number,
                created_at: now,
                updated_at: now,
            }),
        };

        state.users.insert(
            created.id,
            UserCredentials {
                user: created.clone(),
                password_hash: user.password_hash,
            },
        );
        state.profiles.insert(created.id, profile.clone());
        Ok((created, profile))
    }

    async fn find_user(&self, id: Uuid, visibility: Visibility) -> AppResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .get(&id)
            .map(|c| c.user.clone())
            .filter(|user| visibility.admits(user.deleted_at)))
    }

    async fn find_credentials_by_email(&self, email: &str) -> AppResult<Option<UserCredentials>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|c| c.user.email == email && c.user.deleted_at.is_none())
            .cloned())
    }

    async fn find_credentials(&self, id: Uuid) -> AppResult<Option<UserCredentials>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .get(&id)
            .filter(|c| c.user.deleted_at.is_none())
            .cloned())
    }

    async fn email_taken(&self, email: &str) -> AppResult<bool> {
        let state = self.state.read().await;
        Ok(state.users.values().any(|c| c.user.email == email))
    }

    async fn business_registration_taken(&self, number: &str) -> AppResult<bool> {
        let state = self.state.read().await;
        Ok(state.profiles.values().any(
            |p| matches!(p, Profile::Merchant(m) if m.business_registration_number == number),
        ))
    }

    async fn find_profile(&self, user: &User) -> AppResult<Option<Profile>> {
        let state = self.state.read().await;
        Ok(state.profiles.get(&user.id).cloned())
    }

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: String,
        changed_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        let credentials = state
            .users
            .get_mut(&id)
            .filter(|c| c.user.deleted_at.is_none())
            .ok_or_else(|| AppError::not_found("User not found"))?;
        credentials.password_hash = password_hash;
        credentials.user.last_password_change = Some(changed_at);
        credentials.user.updated_at = Utc::now();
        Ok(())
    }

    async fn set_user_active(&self, id: Uuid, is_active: bool) -> AppResult<Option<User>> {
        let mut state = self.state.write().await;
        Ok(state
            .users
            .get_mut(&id)
            .filter(|c| c.user.deleted_at.is_none())
            .map(|c| {
                c.user.is_active = is_active;
                c.user.updated_at = Utc::now();
                c.user.clone()
            }))
    }

    async fn list_users(
        &self,
        account_type: Option<AccountType>,
        page: u64,
        limit: u64,
    ) -> AppResult<Page<User>> {
        let state = self.state.read().await;
        let mut users: Vec<User> = state
            .users
            .values()
            .map(|c| c.user.clone())
            .filter(|u| u.deleted_at.is_none())
            .filter(|u| account_type.is_none_or(|t| u.account_type == t))
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = users.len() as u64;
        let items = users
            .into_iter()
            .skip(page_offset(page, limit) as usize)
            .take(limit as usize)
            .collect();
        Ok(Page { items, total })
    }
}

#[async_trait]
impl RbacStore for InMemoryRepository {
    async fn create_role(&self, role: NewRole) -> AppResult<RoleWithPermissions> {
        let mut state = self.state.write().await;
        if state.roles.values().any(|r| r.name == role.name) {
            return Err(conflict("A role with this name"));
        }
        let now = Utc::now();
        let created = Role {
            id: Uuid::new_v4(),
            name: role.name,
            user_type: role.user_type,
            description: role.description,
            created_by: role.created_by,
            created_at: now,
            updated_at: now,
        };
        for permission_id in role.permission_ids {
            state.role_permissions.insert((created.id, permission_id));
        }
        state.roles.insert(created.id, created.clone());
        Ok(state.role_with_permissions(&created))
    }

    async fn find_role(&self, id: Uuid) -> AppResult<Option<RoleWithPermissions>> {
        let state = self.state.read().await;
        Ok(state.roles.get(&id).map(|r| state.role_with_permissions(r)))
    }

    async fn role_name_taken(&self, name: &str, exclude: Option<Uuid>) -> AppResult<bool> {
        let state = self.state.read().await;
        Ok(state
            .roles
            .values()
            .any(|r| r.name == name && Some(r.id) != exclude))
    }

    async fn list_roles(
        &self,
        user_type: Option<RoleUserType>,
    ) -> AppResult<Vec<RoleWithPermissions>> {
        let state = self.state.read().await;
        let mut roles: Vec<RoleWithPermissions> = state
            .roles
            .values()
            .filter(|r| user_type.is_none_or(|t| r.user_type == t))
            .map(|r| state.role_with_permissions(r))
            .collect();
        roles.sort_by(|a, b| a.role.name.cmp(&b.role.name));
        Ok(roles)
    }

    async fn update_role(
        &self,
        id: Uuid,
        changes: RoleChanges,
    ) -> AppResult<Option<RoleWithPermissions>> {
        let mut state = self.state.write().await;
        if let Some(name) = &changes.name {
            if state.roles.values().any(|r| &r.name == name && r.id != id) {
                return Err(conflict("A role with this name"));
            }
        }
        let Some(role) = state.roles.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            role.name = name;
        }
        if changes.description.is_some() {
            role.description = changes.description;
        }
        role.updated_at = Utc::now();
        let role = role.clone();

        if let Some(permission_ids) = changes.permission_ids {
            state.role_permissions.retain(|(role_id, _)| *role_id != id);
            for permission_id in permission_ids {
                state.role_permissions.insert((id, permission_id));
            }
        }
        Ok(Some(state.role_with_permissions(&role)))
    }

    async fn delete_role(&self, id: Uuid) -> AppResult<bool> {
        let mut state = self.state.write().await;
        if state.roles.remove(&id).is_none() {
            return Ok(false);
        }
        state.role_permissions.retain(|(role_id, _)| *role_id != id);
        state.user_roles.retain(|(_, role_id)| *role_id != id);
        Ok(true)
    }

    async fn create_permission(&self, permission: NewPermission) -> AppResult<Permission> {
        let mut state = self.state.write().await;
        if state.permissions.values().any(|p| p.name == permission.name) {
            return Err(conflict("A permission with this name"));
        }
        let now = Utc::now();
        let created = Permission {
            id: Uuid::new_v4(),
            category: permission.category,
            name: permission.name,
            user_type: permission.user_type,
            description: permission.description,
            created_at: now,
            updated_at: now,
        };
        state.permissions.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_permission(&self, id: Uuid) -> AppResult<Option<Permission>> {
        let state = self.state.read().await;
        Ok(state.permissions.get(&id).cloned())
    }

    async fn find_permissions(&self, ids: &[Uuid]) -> AppResult<Vec<Permission>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.permissions.get(id).cloned())
            .collect())
    }

    async fn permission_name_taken(&self, name: &str, exclude: Option<Uuid>) -> AppResult<bool> {
        let state = self.state.read().await;
        Ok(state
            .permissions
            .values()
            .any(|p| p.name == name && Some(p.id) != exclude))
    }

    async fn list_permissions(
        &self,
        user_type: Option<RoleUserType>,
    ) -> AppResult<Vec<Permission>> {
        let state = self.state.read().await;
        let mut permissions: Vec<Permission> = state
            .permissions
            .values()
            .filter(|p| user_type.is_none_or(|t| p.user_type == t))
            .cloned()
            .collect();
        permissions.sort_by(|a, b| (&a.category, &a.name).cmp(&(&b.category, &b.name)));
        Ok(permissions)
    }

    async fn update_permission(
        &self,
        id: Uuid,
        changes: PermissionChanges,
    ) -> AppResult<Option<Permission>> {
        let mut state = self.state.write().await;
        if let Some(name) = &changes.name {
            if state
                .permissions
                .values()
                .any(|p| &p.name == name && p.id != id)
            {
                return Err(conflict("A permission with this name"));
            }
        }
        Ok(state.permissions.get_mut(&id).map(|permission| {
            if let Some(category) = changes.category {
                permission.category = category;
            }
            if let Some(name) = changes.name {
                permission.name = name;
            }
            if changes.description.is_some() {
                permission.description = changes.description;
            }
            permission.updated_at = Utc::now();
            permission.clone()
        }))
    }

    async fn delete_permission(&self, id: Uuid) -> AppResult<bool> {
        let mut state = self.state.write().await;
        if state.permissions.remove(&id).is_none() {
            return Ok(false);
        }
        state
            .role_permissions
            .retain(|(_, permission_id)| *permission_id != id);
        Ok(true)
    }

    async fn user_roles(&self, user_id: Uuid) -> AppResult<Vec<RoleWithPermissions>> {
        let state = self.state.read().await;
        Ok(state
            .user_roles
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .filter_map(|(_, role_id)| state.roles.get(role_id))
            .map(|role| state.role_with_permissions(role))
            .collect())
    }

    async fn set_user_roles(&self, user_id: Uuid, role_ids: &[Uuid]) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.user_roles.retain(|(uid, _)| *uid != user_id);
        for role_id in role_ids {
            state.user_roles.insert((user_id, *role_id));
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for InMemoryRepository {
    async fn insert_content(
        &self,
        kind: ContentKind,
        content: NewContent,
    ) -> AppResult<ContentEntity> {
        let mut state = self.state.write().await;
        if state.slug_taken(kind, &content.slug, None) {
            return Err(conflict(&format!("A {} with this slug", kind.label())));
        }
        let now = Utc::now();
        let created = ContentEntity {
            id: Uuid::new_v4(),
            name: content.name,
            slug: content.slug,
            description: content.description,
            city: content.city,
            details: content.details,
            owner_id: content.owner_id,
            is_active: content.is_active,
            vista_verified: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        state.content.entry(kind).or_default().push(created.clone());
        Ok(created)
    }

    async fn find_content(
        &self,
        kind: ContentKind,
        id: Uuid,
        visibility: Visibility,
    ) -> AppResult<Option<ContentEntity>> {
        let state = self.state.read().await;
        Ok(state
            .content
            .get(&kind)
            .and_then(|rows| rows.iter().find(|row| row.id == id))
            .filter(|row| visibility.admits(row.deleted_at))
            .cloned())
    }

    async fn slug_in_use(
        &self,
        kind: ContentKind,
        slug: &str,
        exclude: Option<Uuid>,
    ) -> AppResult<bool> {
        let state = self.state.read().await;
        Ok(state.slug_taken(kind, slug, exclude))
    }

    async fn list_content(
        &self,
        kind: ContentKind,
        filter: &ContentFilter,
        visibility: Visibility,
    ) -> AppResult<Page<ContentEntity>> {
        let state = self.state.read().await;
        let mut rows: Vec<ContentEntity> = state
            .content
            .get(&kind)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_filter(row, filter, visibility))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        // Newest first; insertion order breaks ties between equal timestamps.
        rows.reverse();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = rows.len() as u64;
        let items = rows
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit as usize)
            .collect();
        Ok(Page { items, total })
    }

    async fn update_content(
        &self,
        kind: ContentKind,
        id: Uuid,
        changes: ContentChanges,
    ) -> AppResult<Option<ContentEntity>> {
        let mut state = self.state.write().await;
        if let Some(slug) = &changes.slug {
            if state.slug_taken(kind, slug, Some(id)) {
                return Err(conflict(&format!("A {} with this slug", kind.label())));
            }
        }
        let Some(row) = state
            .content_mut(kind, id)
            .filter(|row| row.deleted_at.is_none())
        else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            row.name = name;
        }
        if let Some(slug) = changes.slug {
            row.slug = slug;
        }
        if changes.description.is_some() {
            row.description = changes.description;
        }
        if changes.city.is_some() {
            row.city = changes.city;
        }
        if let Some(details) = changes.details {
            row.details = details;
        }
        if let Some(active) = changes.is_active {
            row.is_active = active;
        }
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn set_deleted_at(
        &self,
        kind: ContentKind,
        id: Uuid,
        deleted_at: Option<DateTime<Utc>>,
    ) -> AppResult<Option<ContentEntity>> {
        let mut state = self.state.write().await;
        if deleted_at.is_none() {
            let slug = state
                .content
                .get(&kind)
                .and_then(|rows| rows.iter().find(|row| row.id == id))
                .map(|row| row.slug.clone());
            if let Some(slug) = slug {
                if state.slug_taken(kind, &slug, Some(id)) {
                    return Err(conflict(&format!("A {} with this slug", kind.label())));
                }
            }
        }
        Ok(state
            .content_mut(kind, id)
            .filter(|row| row.deleted_at.is_some() != deleted_at.is_some())
            .map(|row| {
                row.deleted_at = deleted_at;
                row.updated_at = Utc::now();
                row.clone()
            }))
    }

    async fn set_flag(
        &self,
        kind: ContentKind,
        id: Uuid,
        flag: ContentFlag,
        value: bool,
    ) -> AppResult<Option<ContentEntity>> {
        let mut state = self.state.write().await;
        Ok(state
            .content_mut(kind, id)
            .filter(|row| row.deleted_at.is_none())
            .map(|row| {
                match flag {
                    ContentFlag::Active => row.is_active = value,
                    ContentFlag::Verified => row.vista_verified = value,
                }
                row.updated_at = Utc::now();
                row.clone()
            }))
    }
}

fn new_image_row(owner_id: Uuid, image: NewImage, sort_order: i32) -> Image {
    let now = Utc::now();
    Image {
        id: Uuid::new_v4(),
        owner_id,
        image_url: image.image_url,
        storage_key: image.storage_key,
        file_name: image.file_name,
        size: image.size,
        mimetype: image.mimetype,
        caption: image.caption,
        is_featured: image.is_featured,
        sort_order,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl ImageStore for InMemoryRepository {
    async fn list_images(&self, kind: ContentKind, owner_id: Uuid) -> AppResult<Vec<Image>> {
        let state = self.state.read().await;
        Ok(state.owner_images(kind, owner_id))
    }

    async fn find_image(
        &self,
        kind: ContentKind,
        owner_id: Uuid,
        image_id: Uuid,
    ) -> AppResult<Option<Image>> {
        let state = self.state.read().await;
        Ok(state.images.get(&kind).and_then(|rows| {
            rows.iter()
                .find(|image| image.owner_id == owner_id && image.id == image_id)
                .cloned()
        }))
    }

    async fn insert_images(
        &self,
        kind: ContentKind,
        owner_id: Uuid,
        images: Vec<NewImage>,
    ) -> AppResult<Vec<Image>> {
        let batch = images.into_iter().map(ImageUpsert::Insert).collect();
        self.apply_image_batch(kind, owner_id, batch).await
    }

    async fn apply_image_batch(
        &self,
        kind: ContentKind,
        owner_id: Uuid,
        batch: Vec<ImageUpsert>,
    ) -> AppResult<Vec<Image>> {
        let mut state = self.state.write().await;

        // Validate the whole batch before touching anything.
        for item in &batch {
            if let ImageUpsert::Update { id, .. } = item {
                let owned = state.images.get(&kind).is_some_and(|rows| {
                    rows.iter()
                        .any(|image| image.id == *id && image.owner_id == owner_id)
                });
                if !owned {
                    return Err(AppError::not_found(format!(
                        "Image {} not found for this {}",
                        id,
                        kind.label()
                    )));
                }
            }
        }

        let mut next_order = state
            .images
            .get(&kind)
            .and_then(|rows| {
                rows.iter()
                    .filter(|image| image.owner_id == owner_id)
                    .map(|image| image.sort_order)
                    .max()
            })
            .map_or(0, |max| max + 1);

        let mut touched = Vec::with_capacity(batch.len());
        let mut featured = None;
        let rows = state.images.entry(kind).or_default();

        for item in batch {
            match item {
                ImageUpsert::Update { id, changes } => {
                    if let Some(image) = rows.iter_mut().find(|image| image.id == id) {
                        if let Some(url) = changes.image_url {
                            image.image_url = url;
                        }
                        if changes.caption.is_some() {
                            image.caption = changes.caption;
                        }
                        if let Some(order) = changes.sort_order {
                            image.sort_order = order;
                        }
                        if let Some(is_featured) = changes.is_featured {
                            image.is_featured = is_featured;
                            if is_featured {
                                featured = Some(id);
                            }
                        }
                        image.updated_at = Utc::now();
                    }
                    touched.push(id);
                }
                ImageUpsert::Insert(image) => {
                    let sort_order = image.sort_order.unwrap_or_else(|| {
                        let order = next_order;
                        next_order += 1;
                        order
                    });
                    let row = new_image_row(owner_id, image, sort_order);
                    if row.is_featured {
                        featured = Some(row.id);
                    }
                    touched.push(row.id);
                    rows.push(row);
                }
            }
        }

        if let Some(target) = featured {
            state.feature_only(kind, owner_id, target);
        }

        let mut images: Vec<Image> = state
            .owner_images(kind, owner_id)
            .into_iter()
            .filter(|image| touched.contains(&image.id))
            .collect();
        sort_images(&mut images);
        Ok(images)
    }

    async fn delete_image(
        &self,
        kind: ContentKind,
        owner_id: Uuid,
        image_id: Uuid,
    ) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let rows = state.images.entry(kind).or_default();
        let before = rows.len();
        rows.retain(|image| !(image.owner_id == owner_id && image.id == image_id));
        Ok(rows.len() < before)
    }

    async fn set_featured_image(
        &self,
        kind: ContentKind,
        owner_id: Uuid,
        image_id: Uuid,
    ) -> AppResult<Option<Image>> {
        let mut state = self.state.write().await;
        let exists = state.images.get(&kind).is_some_and(|rows| {
            rows.iter()
                .any(|image| image.owner_id == owner_id && image.id == image_id)
        });
        if !exists {
            return Ok(None);
        }
        state.feature_only(kind, owner_id, image_id);
        Ok(state
            .owner_images(kind, owner_id)
            .into_iter()
            .find(|image| image.id == image_id))
    }
}
