use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    http::HeaderName,
    middleware,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Identity, access control and configuration.
pub mod auth;
pub mod config;
pub mod password;
pub mod rbac;

// Domain services.
pub mod accounts;
pub mod bootstrap;
pub mod images;
pub mod lifecycle;
pub mod roles;

// Data, persistence and storage.
pub mod dto;
pub mod error;
pub mod models;
pub mod repository;
pub mod slug;
pub mod storage;
pub mod validation;

// HTTP surface.
pub mod handlers;
pub mod routes;

use accounts::AccountService;
use auth::TokenService;
use config::Env;
use images::ImageSetManager;
use lifecycle::ContentLifecycle;
use models::ContentKind;
use roles::RoleService;
use routes::{admin, authenticated, content, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// Upper bound of any request body. Per-file image caps are lower and per kind.
pub const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// ApiDoc
///
/// The OpenAPI document served at `/api-docs/openapi.json`. Content routes are
/// documented once under `/{entity}`; every collection shares them.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::login_admin, handlers::auth::login_merchant, handlers::auth::login_customer,
        handlers::auth::refresh, handlers::auth::logout, handlers::auth::register_customer,
        handlers::auth::register_merchant, handlers::auth::get_me, handlers::auth::change_password,
        handlers::content::create_content, handlers::content::list_content,
        handlers::content::list_deleted_content, handlers::content::get_content,
        handlers::content::update_content, handlers::content::delete_content,
        handlers::content::restore_content, handlers::content::toggle_status,
        handlers::content::toggle_verified,
        handlers::images::add_images, handlers::images::update_images,
        handlers::images::delete_image, handlers::images::set_featured_image,
        handlers::rbac::create_role, handlers::rbac::list_roles, handlers::rbac::get_role,
        handlers::rbac::update_role, handlers::rbac::delete_role,
        handlers::rbac::create_permission, handlers::rbac::list_permissions,
        handlers::rbac::get_permission, handlers::rbac::update_permission,
        handlers::rbac::delete_permission,
        handlers::users::create_admin, handlers::users::list_users,
        handlers::users::assign_roles, handlers::users::set_user_status,
    ),
    components(
        schemas(
            models::User, models::AccountType, models::AdminProfile, models::MerchantProfile,
            models::CustomerProfile, models::Role, models::Permission, models::RoleUserType,
            models::RoleWithPermissions, models::ContentEntity, models::ContentWithImages,
            models::Image, models::ContentKind,
            dto::Pagination, dto::LoginRequest, dto::RegisterCustomerRequest,
            dto::RegisterMerchantRequest, dto::CreateAdminRequest, dto::RefreshRequest,
            dto::ChangePasswordRequest, dto::AuthResponse, dto::AccessTokenResponse,
            dto::MeResponse, dto::RegisteredUser, dto::CreateContentRequest,
            dto::UpdateContentRequest, dto::FlagRequest, dto::ImageBatchItem,
            dto::ImageBatchRequest, dto::CreateRoleRequest, dto::UpdateRoleRequest,
            dto::CreatePermissionRequest, dto::UpdatePermissionRequest, dto::AssignRolesRequest,
            error::FieldError,
        )
    ),
    tags(
        (name = "auth", description = "Sign-in, tokens and self-service accounts"),
        (name = "content", description = "Lifecycle of every content collection"),
        (name = "images", description = "Image sets of content rows"),
        (name = "rbac", description = "Roles and permissions"),
        (name = "users", description = "Account administration")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, cloneable container of every shared service. Handlers pull what
/// they need through `FromRef` or build a per-request service from it.
#[derive(Clone)]
pub struct AppState {
    /// Persistence for users, RBAC, content and images.
    pub repo: RepositoryState,
    /// Object storage holding uploaded images.
    pub storage: StorageState,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

impl AppState {
    pub fn tokens(&self) -> TokenService {
        TokenService::from_config(&self.config)
    }

    pub fn accounts(&self) -> AccountService {
        AccountService::new(self.repo.clone(), self.tokens())
    }

    pub fn roles(&self) -> RoleService {
        RoleService::new(self.repo.clone())
    }

    pub fn lifecycle(&self, kind: ContentKind) -> ContentLifecycle {
        ContentLifecycle::new(self.repo.clone(), self.storage.clone(), kind)
    }

    pub fn images(&self, kind: ContentKind) -> ImageSetManager {
        ImageSetManager::new(self.repo.clone(), self.storage.clone(), kind)
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles every route group, applies the body limit and the observability
/// layers, and registers the application state.
pub fn create_router(state: AppState) -> Router {
    let expose_error_details = state.config.env != Env::Production;

    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    // Each protected route carries its own access gate (see `routes::guarded`).
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(authenticated::authenticated_routes(&state))
        .merge(content::content_routes(&state))
        .merge(admin::admin_routes(&state))
        // 3. Body Limit: multipart uploads are buffered, so the cap applies to the whole request.
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        // 3a. Internal error detail is written into bodies outside production only.
        .layer(middleware::map_response_with_state(
            expose_error_details,
            error::attach_error_detail,
        ))
        .with_state(state);

    // 4. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                // 4a. Request ID Generation
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 4b. Request Tracing, correlated by the generated request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 4c. Request ID Propagation back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 5. CORS Layer (outermost)
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: method, URI and the `x-request-id` set by the
/// layer above, so every log line of one request shares an ID.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
