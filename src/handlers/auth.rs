use axum::{
    Json,
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;

use super::created;
use crate::{
    AppState,
    auth::{
        AuthUser, REFRESH_COOKIE, with_access_cookie, with_auth_cookies, without_auth_cookies,
    },
    dto::{
        AccessTokenResponse, ApiResponse, AuthResponse, ChangePasswordRequest, LoginRequest,
        MeResponse, RefreshRequest, RegisterCustomerRequest, RegisterMerchantRequest,
    },
    error::{AppError, AppResult},
    models::AccountType,
    validation::ValidatedJson,
};

async fn login(
    state: AppState,
    jar: CookieJar,
    expected: AccountType,
    req: LoginRequest,
) -> AppResult<(CookieJar, Json<ApiResponse<AuthResponse>>)> {
    let session = state.accounts().login(expected, req).await?;
    let jar = with_auth_cookies(jar, &session.access_token, &session.refresh_token, &state.config);
    Ok((jar, Json(ApiResponse::with_message(session, "Login successful"))))
}

/// login_admin
///
/// [Public Route] Signs in to the admin portal. Non-admin accounts with a correct
/// password get 403; a wrong password or unknown email gets 401.
#[utoipa::path(
    post,
    path = "/auth/admin/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in; tokens also set as cookies", body = AuthResponse),
        (status = 400, description = "Missing or malformed email or password"),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account belongs to another portal")
    ),
    tag = "auth"
)]
pub async fn login_admin(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    login(state, jar, AccountType::Admin, req).await
}

/// [Public Route] Signs in to the merchant portal.
#[utoipa::path(
    post,
    path = "/auth/merchant/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account belongs to another portal")
    ),
    tag = "auth"
)]
pub async fn login_merchant(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    login(state, jar, AccountType::Merchant, req).await
}

/// [Public Route] Signs in to the customer app.
#[utoipa::path(
    post,
    path = "/auth/customer/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account belongs to another portal")
    ),
    tag = "auth"
)]
pub async fn login_customer(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    login(state, jar, AccountType::Customer, req).await
}

/// refresh
///
/// [Public Route] Exchanges a refresh token for a new access token. The token is
/// read from the JSON body when present, else from the `refresh_token` cookie.
///
/// *Fail closed*: any failure clears both auth cookies before answering 401.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body(
        content = RefreshRequest,
        description = "Optional when the refresh cookie is sent"
    ),
    responses(
        (status = 200, description = "New access token", body = AccessTokenResponse),
        (status = 401, description = "Refresh token missing, invalid or expired")
    ),
    tag = "auth"
)]
pub async fn refresh(State(state): State<AppState>, jar: CookieJar, body: Bytes) -> Response {
    let from_body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<RefreshRequest>(&body)
            .ok()
            .and_then(|req| req.refresh_token)
    };
    let token = from_body
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()))
        .filter(|t| !t.is_empty());

    let result = match token {
        Some(token) => state.accounts().refresh(&token).await,
        None => Err(AppError::unauthorized("Refresh token required")),
    };

    match result {
        Ok(tokens) => {
            let jar = with_access_cookie(jar, &tokens.access_token, &state.config);
            (jar, Json(ApiResponse::success(tokens))).into_response()
        }
        Err(e) => (without_auth_cookies(jar), e).into_response(),
    }
}

/// logout
///
/// [Public Route] Clears the auth cookies. Tokens are stateless, so an access
/// token copied elsewhere stays valid until it expires.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 200, description = "Cookies cleared")),
    tag = "auth"
)]
pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    (
        without_auth_cookies(jar),
        Json(ApiResponse::message("Logged out")),
    )
}

/// [Public Route] Creates a customer account and its profile in one transaction.
#[utoipa::path(
    post,
    path = "/auth/customer/register",
    request_body = RegisterCustomerRequest,
    responses(
        (status = 201, description = "Customer registered"),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Email already registered")
    ),
    tag = "auth"
)]
pub async fn register_customer(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterCustomerRequest>,
) -> AppResult<impl IntoResponse> {
    let registered = state.accounts().register_customer(req).await?;
    Ok(created(registered, "Customer registered"))
}

/// [Public Route] Creates a merchant account and its business profile in one transaction.
#[utoipa::path(
    post,
    path = "/auth/merchant/register",
    request_body = RegisterMerchantRequest,
    responses(
        (status = 201, description = "Merchant registered"),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Email or business registration number already registered")
    ),
    tag = "auth"
)]
pub async fn register_merchant(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterMerchantRequest>,
) -> AppResult<impl IntoResponse> {
    let registered = state.accounts().register_merchant(req).await?;
    Ok(created(registered, "Merchant registered"))
}

/// get_me
///
/// [Authenticated Route] The caller's user row, profile, role names and the
/// union of their permissions.
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Not authenticated")
    ),
    tag = "auth"
)]
pub async fn get_me(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<MeResponse>>> {
    Ok(Json(ApiResponse::success(state.accounts().me(&user).await?)))
}

/// change_password
///
/// [Authenticated Route] Replaces the caller's password. Every token issued
/// before the change stops working; a fresh pair is returned and set as cookies.
#[utoipa::path(
    patch,
    path = "/auth/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = AuthResponse),
        (status = 400, description = "Current password wrong or new password invalid")
    ),
    tag = "auth"
)]
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> AppResult<impl IntoResponse> {
    let session = state.accounts().change_password(&user, req).await?;
    let jar = with_auth_cookies(jar, &session.access_token, &session.refresh_token, &state.config);
    Ok((jar, Json(ApiResponse::with_message(session, "Password changed"))))
}
