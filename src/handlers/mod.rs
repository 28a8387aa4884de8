//! HTTP handlers, grouped by surface.
//!
//! Handlers only extract, delegate to a service built from `AppState`, and wrap
//! the result in the `ApiResponse` envelope. Authorization happens in the
//! access gate layered on each route; ownership and validation in the services.

pub mod auth;
pub mod content;
pub mod images;
pub mod rbac;
pub mod users;

use axum::{Json, http::StatusCode};
use serde::Serialize;

use crate::dto::{ApiResponse, FlagRequest};
use crate::error::{AppError, AppResult};

/// `201 Created` with the envelope.
pub(crate) fn created<T: Serialize>(
    data: T,
    message: impl Into<String>,
) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(ApiResponse::with_message(data, message)))
}

/// Toggle bodies are optional; an empty body means "invert".
pub(crate) fn flag_value(body: &[u8]) -> AppResult<Option<bool>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice::<FlagRequest>(body)
        .map(|req| req.value)
        .map_err(|e| AppError::bad_request(format!("Invalid JSON body: {}", e)))
}
