//! Input validation.
//!
//! `ValidatedJson` runs the derive-based field rules. The functions below are
//! the checks that need data: each takes the store it reads from explicitly.

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
};
use serde::de::DeserializeOwned;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::error::{AppError, AppResult, FieldError};
use crate::models::ContentKind;
use crate::repository::{ContentStore, UserStore};
use crate::slug::{is_valid_slug, slugify};

/// Validated JSON extractor: deserializes, then validates. A malformed body is
/// a 400 `BadRequest`; failed field rules are a 400 `Validation` listing each field.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| AppError::bad_request(e.body_text()))?;

        value.validate().map_err(into_field_errors)?;

        Ok(ValidatedJson(value))
    }
}

/// Flattens validator output into one `FieldError` per failed rule. Field names
/// are reported in the camelCase used on the wire; nested list items as `images[0].imageUrl`.
pub fn into_field_errors(errors: ValidationErrors) -> AppError {
    let mut fields = Vec::new();
    collect(&errors, "", &mut fields);
    fields.sort_by(|a, b| a.field.cmp(&b.field));
    AppError::Validation(fields)
}

fn collect(errors: &ValidationErrors, prefix: &str, out: &mut Vec<FieldError>) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path = format!("{}{}", prefix, camel_case(field));
        match kind {
            ValidationErrorsKind::Field(errs) => {
                for e in errs {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} is invalid", path));
                    out.push(FieldError::new(path.clone(), message));
                }
            }
            ValidationErrorsKind::Struct(inner) => collect(inner, &format!("{}.", path), out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect(inner, &format!("{}[{}].", path, index), out);
                }
            }
        }
    }
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Trimmed and lowercased. Emails are stored and looked up in this form.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub async fn ensure_email_available<R>(users: &R, email: &str) -> AppResult<()>
where
    R: UserStore + ?Sized,
{
    if users.email_taken(email).await? {
        return Err(AppError::conflict("A user with this email already exists"));
    }
    Ok(())
}

pub async fn ensure_business_registration_available<R>(users: &R, number: &str) -> AppResult<()>
where
    R: UserStore + ?Sized,
{
    if users.business_registration_taken(number).await? {
        return Err(AppError::conflict(
            "A merchant with this business registration number already exists",
        ));
    }
    Ok(())
}

/// resolve_slug
///
/// An explicit slug is trimmed and must match `^[a-z0-9-]+$`; otherwise the slug
/// is derived from `name`. A name with nothing slug-able in it is rejected.
pub fn resolve_slug(name: &str, explicit: Option<&str>) -> AppResult<String> {
    match explicit.map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) if is_valid_slug(slug) => Ok(slug.to_string()),
        Some(_) => Err(AppError::field(
            "slug",
            "Slug must be lowercase letters and digits, separated by single hyphens",
        )),
        None => {
            let derived = slugify(name);
            if derived.is_empty() {
                Err(AppError::field(
                    "name",
                    "Name must contain at least one letter or digit",
                ))
            } else {
                Ok(derived)
            }
        }
    }
}

/// Fails with `Conflict` when a live row of `kind` other than `exclude` uses `slug`.
pub async fn ensure_slug_available<R>(
    content: &R,
    kind: ContentKind,
    slug: &str,
    exclude: Option<Uuid>,
) -> AppResult<()>
where
    R: ContentStore + ?Sized,
{
    if content.slug_in_use(kind, slug, exclude).await? {
        return Err(AppError::conflict(format!(
            "A {} with the slug '{}' already exists",
            kind.label().to_lowercase(),
            slug
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::ImageBatchRequest;
    use crate::repository::InMemoryRepository;

    #[test]
    fn explicit_slugs_must_match_the_pattern() {
        assert_eq!(resolve_slug("Ignored", Some("my-slug")).unwrap(), "my-slug");
        assert!(matches!(
            resolve_slug("Ignored", Some("My Slug")),
            Err(AppError::Validation(_))
        ));
        assert_eq!(resolve_slug("Sunset Kayak Tour!!", None).unwrap(), "sunset-kayak-tour");
        assert_eq!(resolve_slug("Sunset Kayak Tour", Some("  ")).unwrap(), "sunset-kayak-tour");
        assert!(resolve_slug("!!!", None).is_err());
    }

    #[test]
    fn nested_item_errors_carry_their_index() {
        let req: ImageBatchRequest = serde_json::from_value(serde_json::json!({
            "images": [{ "imageUrl": "https://ok.test/a.png" }, { "imageUrl": "not a url" }]
        }))
        .unwrap();

        let AppError::Validation(fields) = into_field_errors(req.validate().unwrap_err()) else {
            panic!("expected validation error");
        };
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].field, "images[1].imageUrl");
    }

    #[test]
    fn camel_cases_field_names() {
        assert_eq!(camel_case("business_registration_number"), "businessRegistrationNumber");
        assert_eq!(camel_case("email"), "email");
    }

    #[tokio::test]
    async fn email_checks_use_the_given_store() {
        let repo = InMemoryRepository::new();
        assert!(ensure_email_available(&repo, "new@vista.test").await.is_ok());
        assert!(
            ensure_slug_available(&repo, ContentKind::Guide, "anything", None)
                .await
                .is_ok()
        );
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Ops@Vista.TEST "), "ops@vista.test");
    }
}
