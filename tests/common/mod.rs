#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::Value;
use std::sync::Arc;
use tower::util::ServiceExt;
use travel_platform::{
    AppConfig, AppState, InMemoryRepository, MockStorageService, bootstrap, create_router,
    auth::TokenService,
    models::{AccountType, NewProfile, NewRole, NewUser, RoleUserType, User},
    password::hash_password,
    repository::{RbacStore, RepositoryState, UserStore},
    storage::StorageState,
};
use uuid::Uuid;

pub const PASSWORD: &str = "correct-horse-battery";

/// TestApp
///
/// A router over the in-memory repository and mock storage. The handles stay
/// shared with the router, so tests can seed data and inspect storage calls.
pub struct TestApp {
    pub router: Router,
    pub repo: Arc<InMemoryRepository>,
    pub storage: MockStorageService,
    pub config: AppConfig,
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(MockStorageService::new(), AppConfig::default())
}

pub fn spawn_app_with(storage: MockStorageService, config: AppConfig) -> TestApp {
    let repo = Arc::new(InMemoryRepository::new());
    let state = AppState {
        repo: repo.clone() as RepositoryState,
        storage: Arc::new(storage.clone()) as StorageState,
        config: config.clone(),
    };
    TestApp {
        router: create_router(state),
        repo,
        storage,
        config,
    }
}

impl TestApp {
    /// Creates an active user of `account_type` whose password is `PASSWORD`.
    pub async fn create_user(&self, account_type: AccountType, email: &str) -> User {
        self.insert_user(account_type, email, false).await
    }

    pub async fn create_super_admin(&self, email: &str) -> User {
        self.insert_user(AccountType::Admin, email, true).await
    }

    async fn insert_user(
        &self,
        account_type: AccountType,
        email: &str,
        is_super_admin: bool,
    ) -> User {
        let profile = match account_type {
            AccountType::Admin => NewProfile::Admin {
                full_name: "Ops Admin".to_string(),
            },
            AccountType::Merchant => NewProfile::Merchant {
                business_name: "Hilltop Stays".to_string(),
                business_registration_number: format!("BRN-{}", Uuid::new_v4()),
                mobile_number: None,
            },
            AccountType::Customer => NewProfile::Customer {
                full_name: "Casey Traveller".to_string(),
                mobile_number: None,
            },
        };
        let user = NewUser {
            email: email.to_string(),
            password_hash: hash_password(PASSWORD.to_string()).await.unwrap(),
            account_type,
            is_super_admin,
        };
        self.repo
            .create_user_with_profile(user, profile)
            .await
            .unwrap()
            .0
    }

    /// Seeds the permission catalog and gives `user` a fresh role holding `permissions`.
    pub async fn grant(&self, user: &User, permissions: &[&str]) {
        bootstrap::seed_permission_catalog(self.repo.as_ref())
            .await
            .unwrap();
        let catalog = self.repo.list_permissions(None).await.unwrap();
        let permission_ids = permissions
            .iter()
            .map(|name| {
                catalog
                    .iter()
                    .find(|p| p.name == *name)
                    .unwrap_or_else(|| panic!("{} is not in the catalog", name))
                    .id
            })
            .collect();
        let user_type = match user.account_type {
            AccountType::Merchant => RoleUserType::Merchant,
            _ => RoleUserType::Admin,
        };
        let role = self
            .repo
            .create_role(NewRole {
                name: format!("role-{}", Uuid::new_v4()),
                user_type,
                description: None,
                created_by: None,
                permission_ids,
            })
            .await
            .unwrap();
        self.repo
            .set_user_roles(user.id, &[role.role.id])
            .await
            .unwrap();
    }

    pub fn token(&self, user: &User) -> String {
        TokenService::from_config(&self.config)
            .issue_access(user)
            .unwrap()
    }

    /// Sends the request and returns the status with the JSON body (`Null` when empty).
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub const BOUNDARY: &str = "travel-platform-test-boundary";

/// A multipart request with one `images` part per `(file name, content type, bytes)`.
pub fn multipart_request(uri: &str, token: &str, files: &[(&str, &str, &[u8])]) -> Request<Body> {
    let mut body = Vec::new();
    for (file_name, content_type, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\n\
                 Content-Disposition: form-data; name=\"images\"; filename=\"{}\"\r\n\
                 Content-Type: {}\r\n\r\n",
                BOUNDARY, file_name, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}
