use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use uuid::Uuid;

use super::{ContentStore, ImageStore, Page, RbacStore, UserStore, page_offset};
use crate::error::{AppError, AppResult};
use crate::models::{
    AccountType, AdminProfile, ContentChanges, ContentEntity, ContentFilter, ContentFlag,
    ContentKind, CustomerProfile, Image, ImageUpsert, MerchantProfile, NewContent, NewImage,
    NewPermission, NewProfile, NewRole, NewUser, Permission, PermissionChanges, Profile, Role,
    RoleChanges, RoleUserType, RoleWithPermissions, User, UserCredentials, Visibility,
};

const USER_COLUMNS: &str = "id, email, account_type, is_active, is_super_admin, \
     last_password_change, created_at, updated_at, deleted_at";
const ROLE_COLUMNS: &str =
    "id, name, user_type, description, created_by, created_at, updated_at";
const PERMISSION_COLUMNS: &str =
    "id, category, name, user_type, description, created_at, updated_at";
const CONTENT_COLUMNS: &str = "id, name, slug, description, city, details, owner_id, \
     is_active, vista_verified, created_at, updated_at, deleted_at";
const IMAGE_COLUMNS: &str = "id, owner_id, image_url, storage_key, file_name, size, mimetype, \
     caption, is_featured, sort_order, created_at, updated_at";

/// PostgresRepository
///
/// The concrete implementation of every store, backed by PostgreSQL. Queries are
/// built at runtime; the only identifiers ever interpolated are the `&'static str`
/// table and column names of `ContentKind` and `ContentFlag`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn visibility_clause(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Live => " AND deleted_at IS NULL",
        Visibility::Deleted => " AND deleted_at IS NOT NULL",
        Visibility::All => "",
    }
}

fn credentials_from_row(row: &PgRow) -> Result<UserCredentials, sqlx::Error> {
    Ok(UserCredentials {
        user: User::from_row(row)?,
        password_hash: row.try_get("password_hash")?,
    })
}

// A permission row tagged with the role it was reached through.
#[derive(FromRow)]
struct LinkedPermission {
    role_id: Uuid,
    #[sqlx(flatten)]
    permission: Permission,
}

async fn attach_permissions(
    conn: &mut PgConnection,
    roles: Vec<Role>,
) -> Result<Vec<RoleWithPermissions>, sqlx::Error> {
    if roles.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = roles.iter().map(|r| r.id).collect();
    let links = sqlx::query_as::<_, LinkedPermission>(
        "SELECT rp.role_id, p.id, p.category, p.name, p.user_type, p.description, \
                p.created_at, p.updated_at \
         FROM role_permissions rp JOIN permissions p ON p.id = rp.permission_id \
         WHERE rp.role_id = ANY($1) \
         ORDER BY p.category, p.name",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    Ok(roles
        .into_iter()
        .map(|role| {
            let permissions = links
                .iter()
                .filter(|link| link.role_id == role.id)
                .map(|link| link.permission.clone())
                .collect();
            RoleWithPermissions { role, permissions }
        })
        .collect())
}

async fn link_permissions(
    conn: &mut PgConnection,
    role_id: Uuid,
    permission_ids: &[Uuid],
) -> Result<(), sqlx::Error> {
    if permission_ids.is_empty() {
        return Ok(());
    }
    sqlx::query(
        "INSERT INTO role_permissions (role_id, permission_id) \
         SELECT $1, UNNEST($2::uuid[]) ON CONFLICT DO NOTHING",
    )
    .bind(role_id)
    .bind(permission_ids)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn next_sort_order(
    conn: &mut PgConnection,
    kind: ContentKind,
    owner_id: Uuid,
) -> Result<i32, sqlx::Error> {
    let sql = format!(
        "SELECT COALESCE(MAX(sort_order), -1) FROM {} WHERE owner_id = $1",
        kind.images_table()
    );
    let max: i32 = sqlx::query_scalar(&sql)
        .bind(owner_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(max + 1)
}

async fn insert_image_row(
    conn: &mut PgConnection,
    kind: ContentKind,
    owner_id: Uuid,
    image: NewImage,
    sort_order: i32,
) -> Result<Image, sqlx::Error> {
    let sql = format!(
        "INSERT INTO {} (id, owner_id, image_url, storage_key, file_name, size, mimetype, \
                         caption, is_featured, sort_order) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {}",
        kind.images_table(),
        IMAGE_COLUMNS
    );
    sqlx::query_as::<_, Image>(&sql)
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(image.image_url)
        .bind(image.storage_key)
        .bind(image.file_name)
        .bind(image.size)
        .bind(image.mimetype)
        .bind(image.caption)
        .bind(image.is_featured)
        .bind(sort_order)
        .fetch_one(&mut *conn)
        .await
}

// Single statement over every image of the owner, so concurrent calls serialize
// on the row locks and exactly one row ends up featured.
async fn feature_only(
    conn: &mut PgConnection,
    kind: ContentKind,
    owner_id: Uuid,
    image_id: Uuid,
) -> Result<(), sqlx::Error> {
    let sql = format!(
        "UPDATE {} SET is_featured = (id = $2), \
             updated_at = CASE WHEN is_featured = (id = $2) THEN updated_at ELSE NOW() END \
         WHERE owner_id = $1",
        kind.images_table()
    );
    sqlx::query(&sql)
        .bind(owner_id)
        .bind(image_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn images_by_id(
    conn: &mut PgConnection,
    kind: ContentKind,
    ids: &[Uuid],
) -> Result<Vec<Image>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = ANY($1) \
         ORDER BY is_featured DESC, sort_order ASC, created_at ASC",
        IMAGE_COLUMNS,
        kind.images_table()
    );
    sqlx::query_as::<_, Image>(&sql)
        .bind(ids)
        .fetch_all(&mut *conn)
        .await
}

fn push_content_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    filter: &ContentFilter,
    visibility: Visibility,
) {
    builder.push(visibility_clause(visibility));

    if let Some(active) = filter.is_active {
        builder.push(" AND is_active = ").push_bind(active);
    }
    if let Some(verified) = filter.vista_verified {
        builder.push(" AND vista_verified = ").push_bind(verified);
    }
    if let Some(city) = filter.city.clone() {
        builder.push(" AND city ILIKE ").push_bind(city);
    }
    if let Some(owner) = filter.owner_id {
        builder.push(" AND owner_id = ").push_bind(owner);
    }
    if let Some(search) = filter.search.as_deref() {
        // Case-insensitive search across name and description.
        let pattern = format!("%{}%", search);
        builder.push(" AND (name ILIKE ").push_bind(pattern.clone());
        builder.push(" OR description ILIKE ").push_bind(pattern);
        builder.push(")");
    }
}

#[async_trait]
impl UserStore for PostgresRepository {
    async fn create_user_with_profile(
        &self,
        user: NewUser,
        profile: NewProfile,
    ) -> AppResult<(User, Profile)> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO users (id, email, password_hash, account_type, is_super_admin) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            USER_COLUMNS
        );
        let created = sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.account_type)
            .bind(user.is_super_admin)
            .fetch_one(&mut *tx)
            .await?;

        let profile = match profile {
            NewProfile::Admin { full_name } => Profile::Admin(
                sqlx::query_as::<_, AdminProfile>(
                    "INSERT INTO admin_profiles (id, user_id, full_name) VALUES ($1, $2, $3) \
                     RETURNING id, user_id, full_name, created_at, updated_at",
                )
                .bind(Uuid::new_v4())
                .bind(created.id)
                .bind(full_name)
                .fetch_one(&mut *tx)
                .await?,
            ),
            NewProfile::Merchant {
                business_name,
                business_registration_number,
                mobile_number,
            } => Profile::Merchant(
                sqlx::query_as::<_, MerchantProfile>(
                    "INSERT INTO merchant_profiles \
                         (id, user_id, business_name, business_registration_number, mobile_number) \
                     VALUES ($1, $2, $3, $4, $5) \
                     RETURNING id, user_id, business_name, business_registration_number, \
                               mobile_number, created_at, updated_at",
                )
                .bind(Uuid::new_v4())
                .bind(created.id)
                .bind(business_name)
                .bind(business_registration_number)
                .bind(mobile_number)
                .fetch_one(&mut *tx)
                .await?,
            ),
            NewProfile::Customer {
                full_name,
                mobile_number,
            } => Profile::Customer(
                sqlx::query_as::<_, CustomerProfile>(
                    "INSERT INTO customer_profiles (id, user_id, full_name, mobile_number) \
                     VALUES ($1, $2, $3, $4) \
                     RETURNING id, user_id, full_name, mobile_number, created_at, updated_at",
                )
                .bind(Uuid::new_v4())
                .bind(created.id)
                .bind(full_name)
                .bind(mobile_number)
                .fetch_one(&mut *tx)
                .await?,
            ),
        };

        tx.commit().await?;
        Ok((created, profile))
    }

    async fn find_user(&self, id: Uuid, visibility: Visibility) -> AppResult<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE id = $1{}",
            USER_COLUMNS,
            visibility_clause(visibility)
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_credentials_by_email(&self, email: &str) -> AppResult<Option<UserCredentials>> {
        let sql = format!(
            "SELECT {}, password_hash FROM users WHERE email = $1 AND deleted_at IS NULL",
            USER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(credentials_from_row).transpose()?)
    }

    async fn find_credentials(&self, id: Uuid) -> AppResult<Option<UserCredentials>> {
        let sql = format!(
            "SELECT {}, password_hash FROM users WHERE id = $1 AND deleted_at IS NULL",
            USER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(credentials_from_row).transpose()?)
    }

    async fn email_taken(&self, email: &str) -> AppResult<bool> {
        Ok(
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn business_registration_taken(&self, number: &str) -> AppResult<bool> {
        Ok(sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM merchant_profiles \
             WHERE business_registration_number = $1)",
        )
        .bind(number)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn find_profile(&self, user: &User) -> AppResult<Option<Profile>> {
        let profile = match user.account_type {
            AccountType::Admin => sqlx::query_as::<_, AdminProfile>(
                "SELECT id, user_id, full_name, created_at, updated_at \
                 FROM admin_profiles WHERE user_id = $1",
            )
            .bind(user.id)
            .fetch_optional(&self.pool)
            .await?
            .map(Profile::Admin),
            AccountType::Merchant => sqlx::query_as::<_, MerchantProfile>(
                "SELECT id, user_id, business_name, business_registration_number, mobile_number, \
                        created_at, updated_at \
                 FROM merchant_profiles WHERE user_id = $1",
            )
            .bind(user.id)
            .fetch_optional(&self.pool)
            .await?
            .map(Profile::Merchant),
            AccountType::Customer => sqlx::query_as::<_, CustomerProfile>(
                "SELECT id, user_id, full_name, mobile_number, created_at, updated_at \
                 FROM customer_profiles WHERE user_id = $1",
            )
            .bind(user.id)
            .fetch_optional(&self.pool)
            .await?
            .map(Profile::Customer),
        };
        Ok(profile)
    }

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: String,
        changed_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, last_password_change = $3, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(password_hash)
        .bind(changed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("User not found"));
        }
        Ok(())
    }

    async fn set_user_active(&self, id: Uuid, is_active: bool) -> AppResult<Option<User>> {
        let sql = format!(
            "UPDATE users SET is_active = $2, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {}",
            USER_COLUMNS
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(is_active)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_users(
        &self,
        account_type: Option<AccountType>,
        page: u64,
        limit: u64,
    ) -> AppResult<Page<User>> {
        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM users WHERE deleted_at IS NULL");
        let mut select: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM users WHERE deleted_at IS NULL",
            USER_COLUMNS
        ));
        if let Some(account_type) = account_type {
            count.push(" AND account_type = ").push_bind(account_type);
            select.push(" AND account_type = ").push_bind(account_type);
        }
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit as i64)
            .push(" OFFSET ")
            .push_bind(page_offset(page, limit) as i64);

        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;
        let items = select
            .build_query_as::<User>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            items,
            total: total as u64,
        })
    }
}

#[async_trait]
impl RbacStore for PostgresRepository {
    async fn create_role(&self, role: NewRole) -> AppResult<RoleWithPermissions> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO roles (id, name, user_type, description, created_by) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            ROLE_COLUMNS
        );
        let created = sqlx::query_as::<_, Role>(&sql)
            .bind(Uuid::new_v4())
            .bind(&role.name)
            .bind(role.user_type)
            .bind(&role.description)
            .bind(role.created_by)
            .fetch_one(&mut *tx)
            .await?;

        link_permissions(&mut tx, created.id, &role.permission_ids).await?;
        let mut with_permissions = attach_permissions(&mut tx, vec![created]).await?;

        tx.commit().await?;
        with_permissions
            .pop()
            .ok_or_else(|| AppError::internal("created role vanished inside its transaction"))
    }

    async fn find_role(&self, id: Uuid) -> AppResult<Option<RoleWithPermissions>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("SELECT {} FROM roles WHERE id = $1", ROLE_COLUMNS);
        let role = sqlx::query_as::<_, Role>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        match role {
            Some(role) => Ok(attach_permissions(&mut conn, vec![role]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn role_name_taken(&self, name: &str, exclude: Option<Uuid>) -> AppResult<bool> {
        Ok(sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM roles WHERE name = $1 AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(name)
        .bind(exclude)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_roles(
        &self,
        user_type: Option<RoleUserType>,
    ) -> AppResult<Vec<RoleWithPermissions>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "SELECT {} FROM roles WHERE ($1::text IS NULL OR user_type = $1) ORDER BY name",
            ROLE_COLUMNS
        );
        let roles = sqlx::query_as::<_, Role>(&sql)
            .bind(user_type)
            .fetch_all(&mut *conn)
            .await?;
        Ok(attach_permissions(&mut conn, roles).await?)
    }

    async fn update_role(
        &self,
        id: Uuid,
        changes: RoleChanges,
    ) -> AppResult<Option<RoleWithPermissions>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE roles SET name = COALESCE($2, name), \
                 description = COALESCE($3, description), updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            ROLE_COLUMNS
        );
        let Some(role) = sqlx::query_as::<_, Role>(&sql)
            .bind(id)
            .bind(changes.name)
            .bind(changes.description)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        if let Some(permission_ids) = changes.permission_ids {
            sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            link_permissions(&mut tx, id, &permission_ids).await?;
        }

        let updated = attach_permissions(&mut tx, vec![role]).await?.pop();
        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_role(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_permission(&self, permission: NewPermission) -> AppResult<Permission> {
        let sql = format!(
            "INSERT INTO permissions (id, category, name, user_type, description) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            PERMISSION_COLUMNS
        );
        Ok(sqlx::query_as::<_, Permission>(&sql)
            .bind(Uuid::new_v4())
            .bind(permission.category)
            .bind(permission.name)
            .bind(permission.user_type)
            .bind(permission.description)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn find_permission(&self, id: Uuid) -> AppResult<Option<Permission>> {
        let sql = format!("SELECT {} FROM permissions WHERE id = $1", PERMISSION_COLUMNS);
        Ok(sqlx::query_as::<_, Permission>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_permissions(&self, ids: &[Uuid]) -> AppResult<Vec<Permission>> {
        let sql = format!(
            "SELECT {} FROM permissions WHERE id = ANY($1) ORDER BY category, name",
            PERMISSION_COLUMNS
        );
        Ok(sqlx::query_as::<_, Permission>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn permission_name_taken(&self, name: &str, exclude: Option<Uuid>) -> AppResult<bool> {
        Ok(sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM permissions \
                           WHERE name = $1 AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(name)
        .bind(exclude)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_permissions(
        &self,
        user_type: Option<RoleUserType>,
    ) -> AppResult<Vec<Permission>> {
        let sql = format!(
            "SELECT {} FROM permissions WHERE ($1::text IS NULL OR user_type = $1) \
             ORDER BY category, name",
            PERMISSION_COLUMNS
        );
        Ok(sqlx::query_as::<_, Permission>(&sql)
            .bind(user_type)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_permission(
        &self,
        id: Uuid,
        changes: PermissionChanges,
    ) -> AppResult<Option<Permission>> {
        let sql = format!(
            "UPDATE permissions SET category = COALESCE($2, category), \
                 name = COALESCE($3, name), description = COALESCE($4, description), \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            PERMISSION_COLUMNS
        );
        Ok(sqlx::query_as::<_, Permission>(&sql)
            .bind(id)
            .bind(changes.category)
            .bind(changes.name)
            .bind(changes.description)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_permission(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn user_roles(&self, user_id: Uuid) -> AppResult<Vec<RoleWithPermissions>> {
        let mut conn = self.pool.acquire().await?;
        let roles = sqlx::query_as::<_, Role>(
            "SELECT r.id, r.name, r.user_type, r.description, r.created_by, r.created_at, \
             r.updated_at \
             FROM roles r JOIN user_roles ur ON ur.role_id = r.id \
             WHERE ur.user_id = $1 ORDER BY r.name",
        )
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(attach_permissions(&mut conn, roles).await?)
    }

    async fn set_user_roles(&self, user_id: Uuid, role_ids: &[Uuid]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        if !role_ids.is_empty() {
            sqlx::query(
                "INSERT INTO user_roles (user_id, role_id) SELECT $1, UNNEST($2::uuid[]) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(user_id)
            .bind(role_ids)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ContentStore for PostgresRepository {
    async fn insert_content(
        &self,
        kind: ContentKind,
        content: NewContent,
    ) -> AppResult<ContentEntity> {
        let sql = format!(
            "INSERT INTO {} (id, name, slug, description, city, details, owner_id, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            kind.table(),
            CONTENT_COLUMNS
        );
        Ok(sqlx::query_as::<_, ContentEntity>(&sql)
            .bind(Uuid::new_v4())
            .bind(content.name)
            .bind(content.slug)
            .bind(content.description)
            .bind(content.city)
            .bind(content.details)
            .bind(content.owner_id)
            .bind(content.is_active)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn find_content(
        &self,
        kind: ContentKind,
        id: Uuid,
        visibility: Visibility,
    ) -> AppResult<Option<ContentEntity>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1{}",
            CONTENT_COLUMNS,
            kind.table(),
            visibility_clause(visibility)
        );
        Ok(sqlx::query_as::<_, ContentEntity>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn slug_in_use(
        &self,
        kind: ContentKind,
        slug: &str,
        exclude: Option<Uuid>,
    ) -> AppResult<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE slug = $1 AND deleted_at IS NULL \
                           AND ($2::uuid IS NULL OR id <> $2))",
            kind.table()
        );
        Ok(sqlx::query_scalar(&sql)
            .bind(slug)
            .bind(exclude)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn list_content(
        &self,
        kind: ContentKind,
        filter: &ContentFilter,
        visibility: Visibility,
    ) -> AppResult<Page<ContentEntity>> {
        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT COUNT(*) FROM {} WHERE TRUE", kind.table()));
        push_content_filters(&mut count, filter, visibility);

        let mut select: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM {} WHERE TRUE",
            CONTENT_COLUMNS,
            kind.table()
        ));
        push_content_filters(&mut select, filter, visibility);
        select
            .push(" ORDER BY created_at DESC, id LIMIT ")
            .push_bind(filter.limit as i64)
            .push(" OFFSET ")
            .push_bind(filter.offset() as i64);

        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;
        let items = select
            .build_query_as::<ContentEntity>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            items,
            total: total as u64,
        })
    }

    async fn update_content(
        &self,
        kind: ContentKind,
        id: Uuid,
        changes: ContentChanges,
    ) -> AppResult<Option<ContentEntity>> {
        let sql = format!(
            "UPDATE {} SET name = COALESCE($2, name), slug = COALESCE($3, slug), \
                 description = COALESCE($4, description), city = COALESCE($5, city), \
                 details = COALESCE($6, details), is_active = COALESCE($7, is_active), \
                 updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {}",
            kind.table(),
            CONTENT_COLUMNS
        );
        Ok(sqlx::query_as::<_, ContentEntity>(&sql)
            .bind(id)
            .bind(changes.name)
            .bind(changes.slug)
            .bind(changes.description)
            .bind(changes.city)
            .bind(changes.details)
            .bind(changes.is_active)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn set_deleted_at(
        &self,
        kind: ContentKind,
        id: Uuid,
        deleted_at: Option<DateTime<Utc>>,
    ) -> AppResult<Option<ContentEntity>> {
        let guard = if deleted_at.is_some() {
            "deleted_at IS NULL"
        } else {
            "deleted_at IS NOT NULL"
        };
        let sql = format!(
            "UPDATE {} SET deleted_at = $2, updated_at = NOW() \
             WHERE id = $1 AND {} RETURNING {}",
            kind.table(),
            guard,
            CONTENT_COLUMNS
        );
        Ok(sqlx::query_as::<_, ContentEntity>(&sql)
            .bind(id)
            .bind(deleted_at)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn set_flag(
        &self,
        kind: ContentKind,
        id: Uuid,
        flag: ContentFlag,
        value: bool,
    ) -> AppResult<Option<ContentEntity>> {
        let sql = format!(
            "UPDATE {} SET {} = $2, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {}",
            kind.table(),
            flag.column(),
            CONTENT_COLUMNS
        );
        Ok(sqlx::query_as::<_, ContentEntity>(&sql)
            .bind(id)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?)
    }
}

#[async_trait]
impl ImageStore for PostgresRepository {
    async fn list_images(&self, kind: ContentKind, owner_id: Uuid) -> AppResult<Vec<Image>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE owner_id = $1 \
             ORDER BY is_featured DESC, sort_order ASC, created_at ASC",
            IMAGE_COLUMNS,
            kind.images_table()
        );
        Ok(sqlx::query_as::<_, Image>(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn find_image(
        &self,
        kind: ContentKind,
        owner_id: Uuid,
        image_id: Uuid,
    ) -> AppResult<Option<Image>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE owner_id = $1 AND id = $2",
            IMAGE_COLUMNS,
            kind.images_table()
        );
        Ok(sqlx::query_as::<_, Image>(&sql)
            .bind(owner_id)
            .bind(image_id)
            .fetch_optional(&self.pool)
            .await?)
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
        let mut tx = self.pool.begin().await?;
        let mut next_order = next_sort_order(&mut tx, kind, owner_id).await?;
        let mut touched = Vec::with_capacity(batch.len());
        let mut featured = None;

        let update_sql = format!(
            "UPDATE {} SET image_url = COALESCE($3, image_url), caption = COALESCE($4, caption), \
                 sort_order = COALESCE($5, sort_order), is_featured = COALESCE($6, is_featured), \
                 updated_at = NOW() \
             WHERE id = $1 AND owner_id = $2 RETURNING id",
            kind.images_table()
        );

        for item in batch {
            match item {
                ImageUpsert::Update { id, changes } => {
                    if changes.is_featured == Some(true) {
                        featured = Some(id);
                    }
                    let updated: Option<Uuid> = sqlx::query_scalar(&update_sql)
                        .bind(id)
                        .bind(owner_id)
                        .bind(changes.image_url)
                        .bind(changes.caption)
                        .bind(changes.sort_order)
                        .bind(changes.is_featured)
                        .fetch_optional(&mut *tx)
                        .await?;
                    // Dropping `tx` rolls the batch back.
                    let id = updated.ok_or_else(|| {
                        AppError::not_found(format!(
                            "Image {} not found for this {}",
                            id,
                            kind.label()
                        ))
                    })?;
                    touched.push(id);
                }
                ImageUpsert::Insert(image) => {
                    let sort_order = match image.sort_order {
                        Some(order) => order,
                        None => {
                            let order = next_order;
                            next_order += 1;
                            order
                        }
                    };
                    let is_featured = image.is_featured;
                    let row = insert_image_row(&mut tx, kind, owner_id, image, sort_order).await?;
                    if is_featured {
                        featured = Some(row.id);
                    }
                    touched.push(row.id);
                }
            }
        }

        if let Some(target) = featured {
            feature_only(&mut tx, kind, owner_id, target).await?;
        }

        let images = images_by_id(&mut tx, kind, &touched).await?;
        tx.commit().await?;
        Ok(images)
    }

    async fn delete_image(
        &self,
        kind: ContentKind,
        owner_id: Uuid,
        image_id: Uuid,
    ) -> AppResult<bool> {
        let sql = format!(
            "DELETE FROM {} WHERE owner_id = $1 AND id = $2",
            kind.images_table()
        );
        let result = sqlx::query(&sql)
            .bind(owner_id)
            .bind(image_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_featured_image(
        &self,
        kind: ContentKind,
        owner_id: Uuid,
        image_id: Uuid,
    ) -> AppResult<Option<Image>> {
        let mut tx = self.pool.begin().await?;

        let lock_sql = format!(
            "SELECT id FROM {} WHERE owner_id = $1 AND id = $2 FOR UPDATE",
            kind.images_table()
        );
        let exists: Option<Uuid> = sqlx::query_scalar(&lock_sql)
            .bind(owner_id)
            .bind(image_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Ok(None);
        }

        feature_only(&mut tx, kind, owner_id, image_id).await?;
        let image = images_by_id(&mut tx, kind, &[image_id]).await?.pop();

        tx.commit().await?;
        Ok(image)
    }
}
