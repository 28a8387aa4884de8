use axum::{
    Router,
    routing::{get, patch},
};

use super::guarded;
use crate::{AppState, handlers::auth, models::AccountType, rbac::AccessPolicy};

/// Authenticated Router Module
///
/// Routes any signed-in account may use, whatever its portal. No permission is
/// required beyond a valid session.
pub fn authenticated_routes(state: &AppState) -> Router<AppState> {
    let signed_in = || {
        AccessPolicy::new()
            .allow_any(AccountType::Admin)
            .allow_any(AccountType::Merchant)
            .allow_any(AccountType::Customer)
    };

    Router::new()
        // GET /auth/me
        // The caller with profile, role names and effective permissions.
        .route("/auth/me", guarded(state, signed_in(), get(auth::get_me)))
        // PATCH /auth/password
        // Retires every token issued before the change.
        .route(
            "/auth/password",
            guarded(state, signed_in(), patch(auth::change_password)),
        )
}
