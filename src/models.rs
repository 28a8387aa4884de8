use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Identity ---

/// AccountType
///
/// The coarse portal tag on every user. Stored as lowercase text.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema, TS,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[ts(export)]
pub enum AccountType {
    Admin,
    Merchant,
    Customer,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Admin => "admin",
            AccountType::Merchant => "merchant",
            AccountType::Customer => "customer",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(AccountType::Admin),
            "merchant" => Ok(AccountType::Merchant),
            "customer" => Ok(AccountType::Customer),
            other => Err(format!("unknown account type '{}'", other)),
        }
    }
}

/// User
///
/// The credential-store row as exposed outward. The password hash lives only in
/// `UserCredentials` and is never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub account_type: AccountType,
    pub is_active: bool,
    // Bypasses permission gating, never account-type gating.
    pub is_super_admin: bool,
    #[ts(type = "string | null")]
    pub last_password_change: Option<DateTime<Utc>>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[ts(type = "string | null")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// A user may authenticate only while active and not soft-deleted.
    pub fn can_sign_in(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }
}

/// User row plus its password hash. Loaded only by the login and password-change flows.
#[derive(Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

impl fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredentials")
            .field("user", &self.user)
            .field("password_hash", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub account_type: AccountType,
    pub is_super_admin: bool,
}

// --- Profiles ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AdminProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MerchantProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub business_name: String,
    // Unique across merchants.
    pub business_registration_number: String,
    pub mobile_number: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CustomerProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    pub mobile_number: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// The 1:1 extension of a user, shaped by its account type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Profile {
    Admin(AdminProfile),
    Merchant(MerchantProfile),
    Customer(CustomerProfile),
}

/// Profile fields supplied at registration, written in the same transaction as the user.
#[derive(Debug, Clone)]
pub enum NewProfile {
    Admin {
        full_name: String,
    },
    Merchant {
        business_name: String,
        business_registration_number: String,
        mobile_number: Option<String>,
    },
    Customer {
        full_name: String,
        mobile_number: Option<String>,
    },
}

impl NewProfile {
    pub fn account_type(&self) -> AccountType {
        match self {
            NewProfile::Admin { .. } => AccountType::Admin,
            NewProfile::Merchant { .. } => AccountType::Merchant,
            NewProfile::Customer { .. } => AccountType::Customer,
        }
    }
}

// --- RBAC ---

/// RoleUserType
///
/// Scope of a role or permission. A role may only hold permissions of its own scope.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema, TS,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[ts(export)]
pub enum RoleUserType {
    System,
    Admin,
    Merchant,
}

impl RoleUserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleUserType::System => "system",
            RoleUserType::Admin => "admin",
            RoleUserType::Merchant => "merchant",
        }
    }
}

impl fmt::Display for RoleUserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub user_type: RoleUserType,
    pub description: Option<String>,
    // The merchant that built the role; admin-created roles carry none.
    pub created_by: Option<Uuid>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Permission {
    pub id: Uuid,
    pub category: String,
    // Unique, e.g. "activity.create".
    pub name: String,
    pub user_type: RoleUserType,
    pub description: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RoleWithPermissions {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone)]
pub struct NewRole {
    pub name: String,
    pub user_type: RoleUserType,
    pub description: Option<String>,
    pub created_by: Option<Uuid>,
    pub permission_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct RoleChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    // `Some` replaces the whole permission set.
    pub permission_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone)]
pub struct NewPermission {
    pub category: String,
    pub name: String,
    pub user_type: RoleUserType,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PermissionChanges {
    pub category: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
}

// --- Content ---

/// ContentKind
///
/// Enumerates every content aggregate. Each kind owns one table and one image
/// table; the identifiers returned here are compile-time constants and are the
/// only table names ever interpolated into SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ContentKind {
    Activity,
    Event,
    Guide,
    Shopping,
    FoodAndBeverage,
    LocalArtist,
    RoomType,
    Homestay,
}

/// The lifecycle operations a permission can grant on a content kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentAction {
    Create,
    Update,
    Delete,
    Restore,
    Verify,
    // Admin oversight of merchant-managed listings (update, delete, restore).
    Moderate,
}

impl ContentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentAction::Create => "create",
            ContentAction::Update => "update",
            ContentAction::Delete => "delete",
            ContentAction::Restore => "restore",
            ContentAction::Verify => "verify",
            ContentAction::Moderate => "moderate",
        }
    }
}

const MB: usize = 1024 * 1024;

impl ContentKind {
    pub const ALL: [ContentKind; 8] = [
        ContentKind::Activity,
        ContentKind::Event,
        ContentKind::Guide,
        ContentKind::Shopping,
        ContentKind::FoodAndBeverage,
        ContentKind::LocalArtist,
        ContentKind::RoomType,
        ContentKind::Homestay,
    ];

    /// URL segment the kind is mounted under.
    pub fn path(&self) -> &'static str {
        match self {
            ContentKind::Activity => "/activities",
            ContentKind::Event => "/events",
            ContentKind::Guide => "/guides",
            ContentKind::Shopping => "/shoppings",
            ContentKind::FoodAndBeverage => "/food-and-beverages",
            ContentKind::LocalArtist => "/local-artists",
            ContentKind::RoomType => "/room-types",
            ContentKind::Homestay => "/homestays",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            ContentKind::Activity => "activities",
            ContentKind::Event => "events",
            ContentKind::Guide => "guides",
            ContentKind::Shopping => "shoppings",
            ContentKind::FoodAndBeverage => "food_and_beverages",
            ContentKind::LocalArtist => "local_artists",
            ContentKind::RoomType => "room_types",
            ContentKind::Homestay => "homestays",
        }
    }

    pub fn images_table(&self) -> &'static str {
        match self {
            ContentKind::Activity => "activities_images",
            ContentKind::Event => "events_images",
            ContentKind::Guide => "guides_images",
            ContentKind::Shopping => "shoppings_images",
            ContentKind::FoodAndBeverage => "food_and_beverages_images",
            ContentKind::LocalArtist => "local_artists_images",
            ContentKind::RoomType => "room_types_images",
            ContentKind::Homestay => "homestays_images",
        }
    }

    /// Prefix of the permission names guarding this kind, e.g. `activity`.
    pub fn permission_category(&self) -> &'static str {
        match self {
            ContentKind::Activity => "activity",
            ContentKind::Event => "event",
            ContentKind::Guide => "guide",
            ContentKind::Shopping => "shopping",
            ContentKind::FoodAndBeverage => "food_and_beverage",
            ContentKind::LocalArtist => "local_artist",
            ContentKind::RoomType => "room_type",
            ContentKind::Homestay => "homestay",
        }
    }

    pub fn permission(&self, action: ContentAction) -> String {
        format!("{}.{}", self.permission_category(), action.as_str())
    }

    /// The portal that authors this kind. Homestays and room types are merchant
    /// listings; everything else is curated by admins.
    pub fn managed_by(&self) -> AccountType {
        match self {
            ContentKind::RoomType | ContentKind::Homestay => AccountType::Merchant,
            _ => AccountType::Admin,
        }
    }

    /// Scope of the permission guarding `action` on this kind. Verification and
    /// moderation are always admin permissions.
    pub fn permission_scope(&self, action: ContentAction) -> RoleUserType {
        match action {
            ContentAction::Verify | ContentAction::Moderate => RoleUserType::Admin,
            _ => match self.managed_by() {
                AccountType::Merchant => RoleUserType::Merchant,
                _ => RoleUserType::Admin,
            },
        }
    }

    /// Object-storage folder for this kind's images.
    pub fn storage_category(&self) -> &'static str {
        self.table()
    }

    /// Per-file upload cap.
    pub fn max_image_bytes(&self) -> usize {
        match self {
            ContentKind::Guide | ContentKind::LocalArtist => 5 * MB,
            ContentKind::RoomType | ContentKind::Homestay => 25 * MB,
            _ => 10 * MB,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ContentKind::Activity => "Activity",
            ContentKind::Event => "Event",
            ContentKind::Guide => "Guide",
            ContentKind::Shopping => "Shopping venue",
            ContentKind::FoodAndBeverage => "Food and beverage listing",
            ContentKind::LocalArtist => "Local artist",
            ContentKind::RoomType => "Room type",
            ContentKind::Homestay => "Homestay",
        }
    }
}

/// The boolean columns that can be toggled in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFlag {
    Active,
    Verified,
}

impl ContentFlag {
    pub fn column(&self) -> &'static str {
        match self {
            ContentFlag::Active => "is_active",
            ContentFlag::Verified => "vista_verified",
        }
    }
}

/// Explicit soft-delete scope of a query. No query has an implicit default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Live,
    Deleted,
    All,
}

impl Visibility {
    pub fn admits(&self, deleted_at: Option<DateTime<Utc>>) -> bool {
        match self {
            Visibility::Live => deleted_at.is_none(),
            Visibility::Deleted => deleted_at.is_some(),
            Visibility::All => true,
        }
    }
}

/// ContentEntity
///
/// The generic shape shared by every content kind. Kind-specific attributes
/// travel in `details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ContentEntity {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub city: Option<String>,
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
    // The merchant who created the row, if any.
    pub owner_id: Option<Uuid>,
    pub is_active: bool,
    pub vista_verified: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[ts(type = "string | null")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ContentWithImages {
    #[serde(flatten)]
    pub entity: ContentEntity,
    pub images: Vec<Image>,
}

#[derive(Debug, Clone)]
pub struct NewContent {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub city: Option<String>,
    pub details: serde_json::Value,
    pub owner_id: Option<Uuid>,
    pub is_active: bool,
}

/// Column changes for an in-place update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentChanges {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub city: Option<String>,
    pub details: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}

/// List filters for `GET /{entity}`.
#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    pub is_active: Option<bool>,
    pub vista_verified: Option<bool>,
    pub city: Option<String>,
    pub search: Option<String>,
    pub owner_id: Option<Uuid>,
    pub page: u64,
    pub limit: u64,
}

impl ContentFilter {
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1) * self.limit
    }
}

// --- Images ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Image {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub image_url: String,
    // Object-storage key; absent for externally hosted URLs.
    pub storage_key: Option<String>,
    pub file_name: Option<String>,
    pub size: Option<i64>,
    pub mimetype: Option<String>,
    pub caption: Option<String>,
    pub is_featured: bool,
    pub sort_order: i32,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewImage {
    pub image_url: String,
    pub storage_key: Option<String>,
    pub file_name: Option<String>,
    pub size: Option<i64>,
    pub mimetype: Option<String>,
    pub caption: Option<String>,
    pub is_featured: bool,
    // `None` appends after the current last image.
    pub sort_order: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageChanges {
    pub image_url: Option<String>,
    pub caption: Option<String>,
    pub sort_order: Option<i32>,
    // `Some(true)` makes this the owner's only featured image.
    pub is_featured: Option<bool>,
}

/// One step of an image batch: update an existing row or append a new one.
#[derive(Debug, Clone)]
pub enum ImageUpsert {
    Update { id: Uuid, changes: ImageChanges },
    Insert(NewImage),
}

/// Featured first, then explicit order, then age.
pub fn sort_images(images: &mut [Image]) {
    images.sort_by(|a, b| {
        b.is_featured
            .cmp(&a.is_featured)
            .then(a.sort_order.cmp(&b.sort_order))
            .then(a.created_at.cmp(&b.created_at))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_names_combine_category_and_action() {
        assert_eq!(
            ContentKind::FoodAndBeverage.permission(ContentAction::Restore),
            "food_and_beverage.restore"
        );
        assert_eq!(ContentKind::Activity.permission(ContentAction::Create), "activity.create");
    }

    #[test]
    fn merchant_listings_use_merchant_scoped_permissions() {
        assert_eq!(
            ContentKind::Homestay.permission_scope(ContentAction::Create),
            RoleUserType::Merchant
        );
        assert_eq!(
            ContentKind::Homestay.permission_scope(ContentAction::Verify),
            RoleUserType::Admin
        );
        assert_eq!(
            ContentKind::Guide.permission_scope(ContentAction::Delete),
            RoleUserType::Admin
        );
    }

    #[test]
    fn every_kind_has_distinct_tables_and_paths() {
        let mut tables: Vec<_> = ContentKind::ALL.iter().map(|k| k.table()).collect();
        tables.sort();
        tables.dedup();
        assert_eq!(tables.len(), ContentKind::ALL.len());

        for kind in ContentKind::ALL {
            assert!(kind.images_table().starts_with(kind.table()));
            assert!(kind.path().starts_with('/'));
            assert!(kind.max_image_bytes() >= 5 * MB && kind.max_image_bytes() <= 25 * MB);
        }
    }

    #[test]
    fn visibility_scopes_soft_deleted_rows() {
        let now = Utc::now();
        assert!(Visibility::Live.admits(None));
        assert!(!Visibility::Live.admits(Some(now)));
        assert!(Visibility::Deleted.admits(Some(now)));
        assert!(!Visibility::Deleted.admits(None));
        assert!(Visibility::All.admits(Some(now)));
    }

    #[test]
    fn account_type_parses_its_wire_names() {
        assert_eq!("merchant".parse::<AccountType>(), Ok(AccountType::Merchant));
        assert!("root".parse::<AccountType>().is_err());
        assert_eq!(
            serde_json::to_string(&AccountType::Customer).unwrap(),
            r#""customer""#
        );
    }
}
