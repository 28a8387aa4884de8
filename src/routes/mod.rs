//! Router Module Index
//!
//! Routing is split by exposure. Each protected route carries its own
//! `AccessPolicy`, applied with `guarded` as a route layer, so no handler can be
//! mounted without an explicit decision about who may call it.

use axum::{middleware, routing::MethodRouter};

use crate::{
    AppState,
    rbac::{self, AccessPolicy, Gate},
};

/// Routes accessible without a token: health, login, refresh, registration.
pub mod public;

/// Routes open to any signed-in account.
pub mod authenticated;

/// The eight content collections, each with its lifecycle and image routes.
pub mod content;

/// RBAC and account administration.
pub mod admin;

/// Wraps `route` in the access gate for `policy`.
pub(crate) fn guarded(
    state: &AppState,
    policy: AccessPolicy,
    route: MethodRouter<AppState>,
) -> MethodRouter<AppState> {
    route.route_layer(middleware::from_fn_with_state(
        Gate::new(state, policy),
        rbac::gate,
    ))
}
