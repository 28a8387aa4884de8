//! Startup seeding: the permission catalog and the first super admin.

use crate::{
    config::AppConfig,
    error::AppResult,
    models::{
        AccountType, ContentAction, ContentKind, NewPermission, NewProfile, NewUser, RoleUserType,
    },
    password::hash_password,
    repository::{RbacStore, UserStore},
    validation::normalize_email,
};

const CRUD: [&str; 4] = ["create", "read", "update", "delete"];

fn entry(category: &str, action: &str, user_type: RoleUserType) -> NewPermission {
    NewPermission {
        category: category.to_string(),
        name: format!("{}.{}", category, action),
        user_type,
        description: None,
    }
}

/// Every permission the routes check, with the scope of the roles that may hold it.
pub fn permission_catalog() -> Vec<NewPermission> {
    let mut catalog = Vec::new();

    for kind in ContentKind::ALL {
        let mut actions = vec![
            ContentAction::Create,
            ContentAction::Update,
            ContentAction::Delete,
            ContentAction::Restore,
            ContentAction::Verify,
        ];
        if kind.managed_by() == AccountType::Merchant {
            actions.push(ContentAction::Moderate);
        }
        for action in actions {
            let mut permission = entry(
                kind.permission_category(),
                action.as_str(),
                kind.permission_scope(action),
            );
            permission.description =
                Some(format!("{} {}", action.as_str(), kind.label().to_lowercase()));
            catalog.push(permission);
        }
    }

    for action in CRUD {
        catalog.push(entry("role", action, RoleUserType::Admin));
        catalog.push(entry("permission", action, RoleUserType::Admin));
        catalog.push(entry("merchant_role", action, RoleUserType::Merchant));
    }
    for action in ["create", "read", "update"] {
        catalog.push(entry("user", action, RoleUserType::Admin));
    }

    catalog
}

/// Inserts the catalog entries that do not exist yet. Safe to run at every start.
pub async fn seed_permission_catalog<R>(repo: &R) -> AppResult<usize>
where
    R: RbacStore + ?Sized,
{
    let mut inserted = 0;
    for permission in permission_catalog() {
        if repo.permission_name_taken(&permission.name, None).await? {
            continue;
        }
        repo.create_permission(permission).await?;
        inserted += 1;
    }
    if inserted > 0 {
        tracing::info!(inserted, "permission catalog seeded");
    }
    Ok(inserted)
}

/// Creates the configured super admin unless a user already holds that email.
pub async fn ensure_super_admin<R>(repo: &R, config: &AppConfig) -> AppResult<()>
where
    R: UserStore + ?Sized,
{
    let (Some(email), Some(password)) = (
        config.bootstrap_admin_email.as_deref(),
        config.bootstrap_admin_password.as_deref(),
    ) else {
        return Ok(());
    };

    let email = normalize_email(email);
    if repo.email_taken(&email).await? {
        return Ok(());
    }

    let password_hash = hash_password(password.to_string()).await?;
    let (user, _) = repo
        .create_user_with_profile(
            NewUser {
                email,
                password_hash,
                account_type: AccountType::Admin,
                is_super_admin: true,
            },
            NewProfile::Admin {
                full_name: "Super Admin".to_string(),
            },
        )
        .await?;

    tracing::info!(user_id = %user.id, "bootstrap super admin created");
    Ok(())
}
