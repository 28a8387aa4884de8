//! # Accounts
//!
//! Registration, login, token refresh, password change and the `me` view.
//! Handlers stay thin; everything that touches credentials lives here.

use chrono::Utc;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::{
    auth::{AuthUser, TokenService, issued_before_password_change},
    dto::{
        AccessTokenResponse, AuthResponse, ChangePasswordRequest, CreateAdminRequest, LoginRequest,
        MeResponse, RegisterCustomerRequest, RegisterMerchantRequest, RegisteredUser,
    },
    error::{AppError, AppResult},
    models::{AccountType, NewProfile, NewUser, User, Visibility},
    password::{hash_password, verify_dummy, verify_password},
    rbac::granted_permissions,
    repository::{RbacStore, RepositoryState, UserStore},
    validation::{ensure_business_registration_available, ensure_email_available, normalize_email},
};

const TOKEN_TYPE: &str = "Bearer";

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// AccountService
///
/// Holds the repository and the token service. Built per request from the
/// application state.
#[derive(Clone)]
pub struct AccountService {
    repo: RepositoryState,
    tokens: TokenService,
}

impl AccountService {
    pub fn new(repo: RepositoryState, tokens: TokenService) -> Self {
        Self { repo, tokens }
    }

    fn session(&self, user: User) -> AppResult<AuthResponse> {
        Ok(AuthResponse {
            access_token: self.tokens.issue_access(&user)?,
            refresh_token: self.tokens.issue_refresh(user.id)?,
            token_type: TOKEN_TYPE.to_string(),
            expires_in: self.tokens.access_ttl_secs(),
            user,
        })
    }

    async fn register(
        &self,
        email: &str,
        password: String,
        account_type: AccountType,
        is_super_admin: bool,
        profile: NewProfile,
    ) -> AppResult<RegisteredUser> {
        let email = normalize_email(email);
        ensure_email_available(self.repo.as_ref(), &email).await?;
        if let NewProfile::Merchant {
            business_registration_number,
            ..
        } = &profile
        {
            ensure_business_registration_available(self.repo.as_ref(), business_registration_number)
                .await?;
        }

        let password_hash = hash_password(password).await?;
        let (user, profile) = self
            .repo
            .create_user_with_profile(
                NewUser {
                    email,
                    password_hash,
                    account_type,
                    is_super_admin,
                },
                profile,
            )
            .await?;

        tracing::info!(user_id = %user.id, account_type = %user.account_type, "account created");
        Ok(RegisteredUser { user, profile })
    }

    pub async fn register_customer(
        &self,
        req: RegisterCustomerRequest,
    ) -> AppResult<RegisteredUser> {
        let profile = NewProfile::Customer {
            full_name: req.full_name.trim().to_string(),
            mobile_number: trimmed(req.mobile_number),
        };
        self.register(&req.email, req.password, AccountType::Customer, false, profile)
            .await
    }

    pub async fn register_merchant(
        &self,
        req: RegisterMerchantRequest,
    ) -> AppResult<RegisteredUser> {
        let profile = NewProfile::Merchant {
            business_name: req.business_name.trim().to_string(),
            business_registration_number: req.business_registration_number.trim().to_string(),
            mobile_number: trimmed(req.mobile_number),
        };
        self.register(&req.email, req.password, AccountType::Merchant, false, profile)
            .await
    }

    /// Admin accounts are created by other admins. Only a super admin can hand
    /// out the super-admin flag.
    pub async fn create_admin(
        &self,
        actor: &AuthUser,
        req: CreateAdminRequest,
    ) -> AppResult<RegisteredUser> {
        if req.is_super_admin && !actor.is_super_admin {
            return Err(AppError::forbidden(
                "Only a super admin can create another super admin",
            ));
        }
        let profile = NewProfile::Admin {
            full_name: req.full_name.trim().to_string(),
        };
        self.register(
            &req.email,
            req.password,
            AccountType::Admin,
            req.is_super_admin,
            profile,
        )
        .await
    }

    /// login
    ///
    /// 1. Lookup: a missing, deleted or disabled user is `InvalidCredentials`,
    ///    after a throwaway hash check so the miss takes as long as a mismatch.
    /// 2. Password check: a mismatch is the same `InvalidCredentials`.
    /// 3. Portal check: a correct password on the wrong portal is 403.
    pub async fn login(&self, expected: AccountType, req: LoginRequest) -> AppResult<AuthResponse> {
        let email = normalize_email(&req.email);

        // 1. Lookup
        let credentials = match self.repo.find_credentials_by_email(&email).await? {
            Some(c) if c.user.can_sign_in() => c,
            _ => {
                verify_dummy(req.password).await?;
                return Err(AppError::InvalidCredentials);
            }
        };

        // 2. Password check
        if !verify_password(req.password, credentials.password_hash).await? {
            tracing::debug!(user_id = %credentials.user.id, "login rejected: wrong password");
            return Err(AppError::InvalidCredentials);
        }

        // 3. Portal check
        if credentials.user.account_type != expected {
            return Err(AppError::forbidden(format!(
                "This account cannot sign in to the {} portal",
                expected
            )));
        }

        tracing::info!(user_id = %credentials.user.id, account_type = %expected, "login");
        self.session(credentials.user)
    }

    /// Exchanges a refresh token for a new access token. Any failure is 401.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<AccessTokenResponse> {
        let claims = self.tokens.verify_refresh(refresh_token)?;

        let user = self
            .repo
            .find_user(claims.sub, Visibility::Live)
            .await?
            .filter(User::can_sign_in)
            .ok_or_else(|| AppError::unauthorized("Invalid refresh token"))?;

        if issued_before_password_change(claims.iat_us, &user) {
            return Err(AppError::unauthorized("Invalid refresh token"));
        }

        Ok(AccessTokenResponse {
            access_token: self.tokens.issue_access(&user)?,
            token_type: TOKEN_TYPE.to_string(),
            expires_in: self.tokens.access_ttl_secs(),
        })
    }

    /// Stores the new hash and stamps `last_password_change`, which retires
    /// every token issued before it. Returns a fresh session.
    pub async fn change_password(
        &self,
        actor: &AuthUser,
        req: ChangePasswordRequest,
    ) -> AppResult<AuthResponse> {
        if req.current_password == req.new_password {
            return Err(AppError::field(
                "newPassword",
                "New password must differ from the current one",
            ));
        }

        let credentials = self
            .repo
            .find_credentials(actor.id)
            .await?
            .ok_or_else(|| AppError::unauthorized("User no longer exists"))?;

        if !verify_password(req.current_password, credentials.password_hash).await? {
            return Err(AppError::field("currentPassword", "Current password is incorrect"));
        }

        let password_hash = hash_password(req.new_password).await?;
        self.repo
            .update_password(actor.id, password_hash, Utc::now())
            .await?;

        let user = self
            .repo
            .find_user(actor.id, Visibility::Live)
            .await?
            .ok_or_else(|| AppError::unauthorized("User no longer exists"))?;

        tracing::info!(user_id = %user.id, "password changed");
        self.session(user)
    }

    pub async fn me(&self, actor: &AuthUser) -> AppResult<MeResponse> {
        let user = self
            .repo
            .find_user(actor.id, Visibility::Live)
            .await?
            .ok_or_else(|| AppError::unauthorized("User no longer exists"))?;
        let profile = self.repo.find_profile(&user).await?;
        let roles = self.repo.user_roles(user.id).await?;

        let permissions: BTreeSet<String> = granted_permissions(&roles).into_iter().collect();
        Ok(MeResponse {
            roles: roles.into_iter().map(|r| r.role.name).collect(),
            permissions: permissions.into_iter().collect(),
            profile,
            user,
        })
    }

    pub async fn find_user(&self, id: Uuid) -> AppResult<User> {
        self.repo
            .find_user(id, Visibility::Live)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::repository::InMemoryRepository;
    use std::sync::Arc;

    fn service() -> AccountService {
        AccountService::new(
            Arc::new(InMemoryRepository::new()),
            TokenService::from_config(&AppConfig::default()),
        )
    }

    fn customer(email: &str) -> RegisterCustomerRequest {
        serde_json::from_value(serde_json::json!({
            "email": email,
            "password": "correct-horse",
            "fullName": "Dayang Aini",
        }))
        .unwrap()
    }

    fn login(email: &str, password: &str) -> LoginRequest {
        serde_json::from_value(serde_json::json!({ "email": email, "password": password }))
            .unwrap()
    }

    #[tokio::test]
    async fn emails_are_unique_case_insensitively() {
        let accounts = service();
        accounts.register_customer(customer("aini@vista.test")).await.unwrap();

        let again = accounts.register_customer(customer("  AINI@vista.test")).await;
        assert!(matches!(again, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn login_hides_whether_the_email_exists() {
        let accounts = service();
        accounts.register_customer(customer("aini@vista.test")).await.unwrap();

        let wrong_password = accounts
            .login(AccountType::Customer, login("aini@vista.test", "nope-nope"))
            .await;
        let unknown = accounts
            .login(AccountType::Customer, login("ghost@vista.test", "nope-nope"))
            .await;

        assert!(matches!(wrong_password, Err(AppError::InvalidCredentials)));
        assert!(matches!(unknown, Err(AppError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn unknown_email_still_pays_for_a_hash_check() {
        let accounts = service();

        let unknown = accounts
            .login(AccountType::Customer, login("ghost@vista.test", "nope-nope"))
            .await;

        assert!(matches!(unknown, Err(AppError::InvalidCredentials)));
        assert!(crate::password::DUMMY_HASH.initialized());
    }

    #[tokio::test]
    async fn wrong_portal_is_forbidden() {
        let accounts = service();
        accounts.register_customer(customer("aini@vista.test")).await.unwrap();

        let result = accounts
            .login(AccountType::Admin, login("aini@vista.test", "correct-horse"))
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn refresh_issues_a_new_access_token() {
        let accounts = service();
        accounts.register_customer(customer("aini@vista.test")).await.unwrap();
        let session = accounts
            .login(AccountType::Customer, login("aini@vista.test", "correct-horse"))
            .await
            .unwrap();

        let refreshed = accounts.refresh(&session.refresh_token).await.unwrap();
        let claims = accounts.tokens.verify_access(&refreshed.access_token).unwrap();
        assert_eq!(claims.sub, session.user.id);

        assert!(accounts.refresh(&session.access_token).await.is_err());
    }

    #[tokio::test]
    async fn only_super_admins_mint_super_admins() {
        let accounts = service();
        let req = || -> CreateAdminRequest {
            serde_json::from_value(serde_json::json!({
                "email": "ops@vista.test",
                "password": "correct-horse",
                "fullName": "Ops",
                "isSuperAdmin": true,
            }))
            .unwrap()
        };
        let admin = AuthUser {
            id: Uuid::new_v4(),
            email: "admin@vista.test".to_string(),
            account_type: AccountType::Admin,
            is_super_admin: false,
        };
        assert!(matches!(
            accounts.create_admin(&admin, req()).await,
            Err(AppError::Forbidden(_))
        ));

        let root = AuthUser {
            is_super_admin: true,
            ..admin
        };
        let created = accounts.create_admin(&root, req()).await.unwrap();
        assert!(created.user.is_super_admin);
    }

    #[tokio::test]
    async fn change_password_requires_the_current_one() {
        let accounts = service();
        let registered = accounts.register_customer(customer("aini@vista.test")).await.unwrap();
        let actor = AuthUser::from(&registered.user);

        let bad: ChangePasswordRequest = serde_json::from_value(serde_json::json!({
            "currentPassword": "not-it-at-all",
            "newPassword": "battery-staple",
        }))
        .unwrap();
        assert!(matches!(
            accounts.change_password(&actor, bad).await,
            Err(AppError::Validation(_))
        ));

        let good: ChangePasswordRequest = serde_json::from_value(serde_json::json!({
            "currentPassword": "correct-horse",
            "newPassword": "battery-staple",
        }))
        .unwrap();
        let session = accounts.change_password(&actor, good).await.unwrap();
        assert!(session.user.last_password_change.is_some());
        assert!(
            accounts
                .login(AccountType::Customer, login("aini@vista.test", "battery-staple"))
                .await
                .is_ok()
        );
    }
}
