//! Request and response bodies of the HTTP surface.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::models::{AccountType, Profile, RoleUserType, User};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;

// --- Envelope ---

/// Pagination block of a list response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Pagination {
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(total: u64, page: u64, limit: u64) -> Self {
        Self {
            total,
            page,
            limit,
            total_pages: if limit > 0 { total.div_ceil(limit) } else { 0 },
        }
    }
}

/// ApiResponse
///
/// The success envelope: `{ success: true, data?, message?, pagination? }`.
/// Failures are rendered by `AppError` in the same shape.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            pagination: None,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::success(data)
        }
    }

    pub fn paginated(data: T, pagination: Pagination) -> Self {
        Self {
            pagination: Some(pagination),
            ..Self::success(data)
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            pagination: None,
        }
    }
}

// --- Auth ---

/// Fields default to empty so that a missing field is reported per field by
/// validation instead of as a malformed body.
#[derive(Debug, Deserialize, Validate, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LoginRequest {
    #[serde(default)]
    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Invalid email format")
    )]
    #[schema(example = "ops@vista.test")]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RegisterCustomerRequest {
    #[serde(default)]
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 120, message = "Full name is required"))]
    pub full_name: String,
    #[validate(length(min = 6, max = 20, message = "Mobile number must be 6 to 20 characters"))]
    pub mobile_number: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RegisterMerchantRequest {
    #[serde(default)]
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "Business name is required"))]
    pub business_name: String,
    #[serde(default)]
    #[validate(length(
        min = 3,
        max = 50,
        message = "Business registration number must be 3 to 50 characters"
    ))]
    pub business_registration_number: String,
    #[validate(length(min = 6, max = 20, message = "Mobile number must be 6 to 20 characters"))]
    pub mobile_number: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateAdminRequest {
    #[serde(default)]
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 120, message = "Full name is required"))]
    pub full_name: String,
    // Only a super admin may grant this.
    #[serde(default)]
    pub is_super_admin: bool,
}

#[derive(Debug, Default, Deserialize, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[serde(default)]
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

/// Issued on login. The same tokens are also set as HttpOnly cookies.
#[derive(Debug, Serialize, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AuthResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user: User,
    #[schema(value_type = Object)]
    pub profile: Option<Profile>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredUser {
    pub user: User,
    #[schema(value_type = Object)]
    pub profile: Profile,
}

// --- Content ---

/// `title` is accepted as an alias of `name`.
#[derive(Debug, Deserialize, Validate, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateContentRequest {
    #[serde(default, alias = "title")]
    #[validate(length(min = 1, max = 200, message = "Name must be 1 to 200 characters"))]
    #[schema(example = "Sunset Kayak Tour")]
    pub name: String,
    pub slug: Option<String>,
    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100, message = "City must be 1 to 100 characters"))]
    pub city: Option<String>,
    #[schema(value_type = Object)]
    #[ts(type = "Record<string, unknown> | null")]
    pub details: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateContentRequest {
    #[serde(alias = "title")]
    #[validate(length(min = 1, max = 200, message = "Name must be 1 to 200 characters"))]
    pub name: Option<String>,
    pub slug: Option<String>,
    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100, message = "City must be 1 to 100 characters"))]
    pub city: Option<String>,
    #[schema(value_type = Object)]
    #[ts(type = "Record<string, unknown> | null")]
    pub details: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}

/// Body of the status and verify toggles. An absent `value` inverts the flag.
#[derive(Debug, Default, Deserialize, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FlagRequest {
    pub value: Option<bool>,
}

/// ContentQuery
///
/// Query string of `GET /{entity}`. `page` defaults to 1 and `limit` to 10,
/// capped at 100.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ContentQuery {
    pub is_active: Option<bool>,
    pub vista_verified: Option<bool>,
    pub city: Option<String>,
    /// Case-insensitive match on name or description.
    pub search: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// Clamps raw paging input: page ≥ 1, 1 ≤ limit ≤ 100.
pub fn paging(page: Option<u64>, limit: Option<u64>) -> (u64, u64) {
    (
        page.unwrap_or(DEFAULT_PAGE).max(1),
        limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
    )
}

// --- Images ---

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ImageBatchItem {
    /// Present: update that image. Absent: append a new one (requires `imageUrl`).
    pub id: Option<Uuid>,
    #[validate(url(message = "Image URL must be a valid URL"))]
    pub image_url: Option<String>,
    #[validate(length(max = 500, message = "Caption must be at most 500 characters"))]
    pub caption: Option<String>,
    pub sort_order: Option<i32>,
    pub is_featured: Option<bool>,
}

#[derive(Debug, Deserialize, Validate, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ImageBatchRequest {
    #[validate(
        length(min = 1, message = "At least one image is required"),
        nested
    )]
    pub images: Vec<ImageBatchItem>,
}

// --- RBAC ---

#[derive(Debug, Deserialize, Validate, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateRoleRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "Role name must be 1 to 100 characters"))]
    pub name: String,
    pub user_type: RoleUserType,
    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    pub description: Option<String>,
    #[serde(default)]
    pub permission_ids: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateRoleRequest {
    #[validate(length(min = 1, max = 100, message = "Role name must be 1 to 100 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    pub description: Option<String>,
    /// Replaces the role's whole permission set when present.
    pub permission_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Deserialize, Validate, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreatePermissionRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "Category is required"))]
    pub category: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "Permission name is required"))]
    #[schema(example = "activity.create")]
    pub name: String,
    pub user_type: RoleUserType,
    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdatePermissionRequest {
    #[validate(length(min = 1, max = 100, message = "Category is required"))]
    pub category: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Permission name is required"))]
    pub name: Option<String>,
    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct UserTypeQuery {
    pub user_type: Option<RoleUserType>,
}

#[derive(Debug, Deserialize, Validate, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AssignRolesRequest {
    pub role_ids: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct UserQuery {
    pub account_type: Option<AccountType>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}
