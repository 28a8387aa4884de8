use axum::{
    Router,
    routing::{get, post},
};

use crate::{AppState, handlers::auth};

/// Public Router Module
///
/// Endpoints reachable without a session. Content reads are public too but are
/// mounted with their collections in `content`.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /auth/{portal}/login
        // One login per portal; the account type must match the portal.
        .route("/auth/admin/login", post(auth::login_admin))
        .route("/auth/merchant/login", post(auth::login_merchant))
        .route("/auth/customer/login", post(auth::login_customer))
        // POST /auth/refresh
        // Refresh token from the body or the `refresh_token` cookie.
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        // Self-service sign-up. Admin accounts are created under /admin/users.
        .route("/auth/customer/register", post(auth::register_customer))
        .route("/auth/merchant/register", post(auth::register_merchant))
}
