use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    models::{AccountType, User, Visibility},
    repository::{RepositoryState, UserStore},
};

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Distinguishes the two token families so one can never stand in for the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims
///
/// Payload of an access token. Signed with `JWT_SECRET` and validated on every
/// authenticated request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user id.
    pub sub: Uuid,
    pub email: String,
    pub account_type: AccountType,
    pub typ: TokenKind,
    /// Issued At (iat), in seconds.
    pub iat: i64,
    /// Issue instant in microseconds, compared against the user's last
    /// password change.
    pub iat_us: i64,
    /// Expiration Time (exp): no leeway is granted.
    pub exp: i64,
}

/// Payload of a refresh token. Signed with `JWT_REFRESH_SECRET`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub typ: TokenKind,
    pub iat: i64,
    pub iat_us: i64,
    pub exp: i64,
}

/// TokenService
///
/// Issues and verifies HS256 tokens. Access and refresh tokens use separate
/// secrets and TTLs taken from `AppConfig`.
#[derive(Clone)]
pub struct TokenService {
    access_secret: String,
    refresh_secret: String,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenService {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            access_secret: config.jwt_secret.clone(),
            refresh_secret: config.jwt_refresh_secret.clone(),
            access_ttl_secs: config.access_token_ttl_secs,
            refresh_ttl_secs: config.refresh_token_ttl_secs,
        }
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl_secs
    }

    pub fn issue_access(&self, user: &User) -> AppResult<String> {
        let issued = Utc::now();
        let now = issued.timestamp();
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            account_type: user.account_type,
            typ: TokenKind::Access,
            iat: now,
            iat_us: issued.timestamp_micros(),
            exp: now + self.access_ttl_secs,
        };
        sign(&claims, &self.access_secret)
    }

    pub fn issue_refresh(&self, user_id: Uuid) -> AppResult<String> {
        let issued = Utc::now();
        let now = issued.timestamp();
        let claims = RefreshClaims {
            sub: user_id,
            typ: TokenKind::Refresh,
            iat: now,
            iat_us: issued.timestamp_micros(),
            exp: now + self.refresh_ttl_secs,
        };
        sign(&claims, &self.refresh_secret)
    }

    pub fn verify_access(&self, token: &str) -> AppResult<Claims> {
        let claims: Claims = verify(token, &self.access_secret)?;
        if claims.typ != TokenKind::Access {
            return Err(AppError::unauthorized("Invalid token"));
        }
        Ok(claims)
    }

    pub fn verify_refresh(&self, token: &str) -> AppResult<RefreshClaims> {
        let claims: RefreshClaims = verify(token, &self.refresh_secret)?;
        if claims.typ != TokenKind::Refresh {
            return Err(AppError::unauthorized("Invalid refresh token"));
        }
        Ok(claims)
    }
}

/// True when a token issued at `iat_us` predates the password change stamped
/// on the user. Compared at microsecond resolution so a change within the same
/// second still retires older tokens.
pub fn issued_before_password_change(iat_us: i64, user: &User) -> bool {
    user.last_password_change
        .is_some_and(|changed_at| iat_us < changed_at.timestamp_micros())
}

fn sign<T: Serialize>(claims: &T, secret: &str) -> AppResult<String> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::internal(format!("token signing failed: {}", e)))
}

fn verify<T: serde::de::DeserializeOwned>(token: &str, secret: &str) -> AppResult<T> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.leeway = 0;

    decode::<T>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AppError::unauthorized("Token expired"),
            _ => AppError::unauthorized("Invalid token"),
        })
}

/// AuthUser
///
/// The resolved identity of an authenticated request. Handlers and the access
/// gate read the account type and super-admin flag from here.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub account_type: AccountType,
    pub is_super_admin: bool,
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            account_type: user.account_type,
            is_super_admin: user.is_super_admin,
        }
    }
}

/// AuthUser Extractor Implementation
///
/// 1. Reuse: an identity already resolved earlier in the request (by the access
///    gate) is taken from the request extensions.
/// 2. Token Extraction: `Authorization: Bearer` header, else the `access_token` cookie.
/// 3. Token Validation: signature and expiry, no leeway.
/// 4. DB Lookup: the user must still exist, not be soft-deleted, be active, and
///    the token must not predate the last password change.
///
/// Rejection: `AppError::Unauthorized` (401) on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // 1. Reuse
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        // 2. Token Extraction
        let token = token_from_headers(&parts.headers)
            .ok_or_else(|| AppError::unauthorized("Authentication required"))?;

        // 3. Token Validation
        let claims = TokenService::from_config(&config).verify_access(&token)?;

        // 4. DB Lookup
        let user = repo
            .find_user(claims.sub, Visibility::Live)
            .await?
            .ok_or_else(|| AppError::unauthorized("User no longer exists"))?;

        if !user.is_active {
            return Err(AppError::unauthorized("Account is disabled"));
        }

        if issued_before_password_change(claims.iat_us, &user) {
            return Err(AppError::unauthorized(
                "Password changed since this token was issued",
            ));
        }

        let auth_user = AuthUser::from(&user);
        parts.extensions.insert(auth_user.clone());
        Ok(auth_user)
    }
}

fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    CookieJar::from_headers(headers)
        .get(ACCESS_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

// --- Cookies ---

fn auth_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(secure)
        .path("/")
        .build()
}

pub fn with_access_cookie(jar: CookieJar, token: &str, config: &AppConfig) -> CookieJar {
    jar.add(auth_cookie(ACCESS_COOKIE, token.to_string(), config.secure_cookies()))
}

pub fn with_auth_cookies(
    jar: CookieJar,
    access_token: &str,
    refresh_token: &str,
    config: &AppConfig,
) -> CookieJar {
    with_access_cookie(jar, access_token, config).add(auth_cookie(
        REFRESH_COOKIE,
        refresh_token.to_string(),
        config.secure_cookies(),
    ))
}

pub fn without_auth_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn service() -> TokenService {
        TokenService::from_config(&AppConfig::default())
    }

    fn user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "ops@vista.test".to_string(),
            account_type: AccountType::Admin,
            is_active: true,
            is_super_admin: false,
            last_password_change: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn access_token_round_trips_its_claims() {
        let user = user();
        let token = service().issue_access(&user).unwrap();
        let claims = service().verify_access(&token).unwrap();

        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.account_type, AccountType::Admin);
        assert_eq!(claims.exp - claims.iat, service().access_ttl_secs());
    }

    #[test]
    fn refresh_tokens_are_not_access_tokens() {
        let refresh = service().issue_refresh(Uuid::new_v4()).unwrap();
        assert!(service().verify_access(&refresh).is_err());

        let access = service().issue_access(&user()).unwrap();
        assert!(service().verify_refresh(&access).is_err());
    }

    #[test]
    fn expired_tokens_are_rejected_without_leeway() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4(),
            email: "x@y.z".to_string(),
            account_type: AccountType::Customer,
            typ: TokenKind::Access,
            iat: now - 120,
            iat_us: (now - 120) * 1_000_000,
            exp: now - 1,
        };
        let token = sign(&claims, &AppConfig::default().jwt_secret).unwrap();

        match service().verify_access(&token) {
            Err(AppError::Unauthorized(msg)) => assert_eq!(msg, "Token expired"),
            other => panic!("expected expiry rejection, got {:?}", other.map(|c| c.sub)),
        }
    }

    #[test]
    fn password_change_in_the_same_second_retires_older_tokens() {
        let second = Utc::now().timestamp();
        let issued_us = second * 1_000_000 + 100;
        let mut changed = user();

        changed.last_password_change = chrono::DateTime::from_timestamp_micros(issued_us + 400);
        assert_eq!(changed.last_password_change.unwrap().timestamp(), second);
        assert!(issued_before_password_change(issued_us, &changed));

        changed.last_password_change = chrono::DateTime::from_timestamp_micros(issued_us);
        assert!(!issued_before_password_change(issued_us, &changed));
        assert!(!issued_before_password_change(issued_us, &user()));
    }

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("access_token=from-cookie"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("from-cookie"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("from-header"));
    }
}
