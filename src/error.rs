use axum::{
    Json,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::storage::StorageError;

/// Internal failure detail left on a 5xx response as an extension. Only
/// [`attach_error_detail`] copies it into the body.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

/// A single failed input check, reported in the `errors` array of a 400 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema, TS)]
#[ts(export)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// AppError
///
/// The error taxonomy every handler, service and repository returns. Each variant
/// maps to one HTTP status; `IntoResponse` renders the shared envelope
/// `{ success: false, message, error?, errors? }`.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    // Same message for unknown email and wrong password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Storage error")]
    Storage(#[from] StorageError),

    #[error("Internal server error")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

// `error` is added later by `attach_error_detail` when the router exposes it.
#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldError>>,
}

impl AppError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        AppError::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            AppError::Database(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                StatusCode::CONFLICT
            }
            AppError::Database(_) | AppError::Storage(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Client-facing message. Internal failures are logged here and replaced
    /// by a generic sentence.
    fn message(&self) -> String {
        match self {
            AppError::Database(sqlx::Error::RowNotFound) => "Resource not found".to_string(),
            AppError::Database(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                match db.constraint() {
                    Some(constraint) => format!("Duplicate value violates {}", constraint),
                    None => "Duplicate value".to_string(),
                }
            }
            AppError::Database(e) => {
                tracing::error!(error = ?e, "database error");
                "A database error occurred".to_string()
            }
            AppError::Storage(e) => {
                tracing::error!(error = %e, "storage error");
                "A storage error occurred".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            AppError::Database(e) => Some(e.to_string()),
            AppError::Storage(e) => Some(e.to_string()),
            AppError::Internal(msg) => Some(msg.clone()),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.detail();
        let body = ErrorBody {
            success: false,
            message: self.message(),
            errors: match self {
                AppError::Validation(errors) => Some(errors),
                _ => None,
            },
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(detail) = detail {
            response.extensions_mut().insert(ErrorDetail(detail));
        }
        response
    }
}

/// attach_error_detail
///
/// Response mapper installed per router. With `expose` set (any `Env` but
/// `Production`), the [`ErrorDetail`] of an error response is written into the
/// `error` field of its envelope. Otherwise the detail is dropped.
pub async fn attach_error_detail(State(expose): State<bool>, mut response: Response) -> Response {
    let Some(ErrorDetail(detail)) = response.extensions_mut().remove::<ErrorDetail>() else {
        return response;
    };
    if !expose {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "error body could not be buffered");
            return Response::from_parts(parts, Body::empty());
        }
    };
    let mut envelope: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(_) => return Response::from_parts(parts, Body::from(bytes)),
    };
    if let Some(fields) = envelope.as_object_mut() {
        fields.insert("error".to_string(), serde_json::Value::String(detail));
    }
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(envelope.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(AppError::field("email", "required").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::forbidden("no").status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::not_found("gone").status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::conflict("slug taken").status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Database(sqlx::Error::RowNotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::internal("boom").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn validation_errors_are_listed_per_field() {
        let response = AppError::Validation(vec![
            FieldError::new("email", "Email is required"),
            FieldError::new("password", "Password is required"),
        ])
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["errors"][1]["field"], "password");
        assert!(json.get("error").is_none());
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn internal_detail_reaches_the_body_only_when_exposed() {
        let response = AppError::internal("pool timed out").into_response();
        assert!(response.extensions().get::<ErrorDetail>().is_some());

        let exposed = body_json(
            attach_error_detail(State(true), AppError::internal("pool timed out").into_response())
                .await,
        )
        .await;
        assert_eq!(exposed["error"], "pool timed out");
        assert_eq!(exposed["message"], "An internal error occurred");

        let hidden =
            attach_error_detail(State(false), AppError::internal("pool timed out").into_response())
                .await;
        assert!(hidden.extensions().get::<ErrorDetail>().is_none());
        assert!(body_json(hidden).await.get("error").is_none());
    }
}
