mod common;

use axum::http::StatusCode;
use common::{empty_request, json_request, spawn_app};
use serde_json::{Value, json};
use travel_platform::{
    models::{AccountType, Visibility},
    repository::{RbacStore, UserStore},
};

fn ids(body: &Value, names: &[&str]) -> Vec<String> {
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|p| names.contains(&p["name"].as_str().unwrap()))
        .map(|p| p["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_customer_is_forbidden_on_admin_routes() {
    let app = spawn_app();
    let customer = app.create_user(AccountType::Customer, "casey@vista.test").await;
    let token = app.token(&customer);

    for (method, uri) in [
        ("GET", "/roles"),
        ("GET", "/permissions"),
        ("GET", "/admin/users"),
        ("GET", "/guides/deleted"),
    ] {
        let (status, body) = app.send(empty_request(method, uri, Some(&token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{} {}", method, uri);
        assert_eq!(body["success"], false);
    }
}

#[tokio::test]
async fn test_admin_routes_require_authentication() {
    let app = spawn_app();
    let (status, _) = app.send(empty_request("GET", "/roles", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_merchant_cannot_create_admin_roles() {
    let app = spawn_app();
    let merchant = app.create_user(AccountType::Merchant, "host@vista.test").await;
    app.grant(&merchant, &["merchant_role.create", "merchant_role.read"])
        .await;
    let roles_before = app.repo.list_roles(None).await.unwrap().len();

    let (status, _) = app
        .send(json_request(
            "POST",
            "/roles",
            Some(&app.token(&merchant)),
            json!({ "name": "Shadow Admins", "userType": "admin" }),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(app.repo.list_roles(None).await.unwrap().len(), roles_before);
}

#[tokio::test]
async fn test_merchant_builds_a_staff_role_from_merchant_permissions() {
    let app = spawn_app();
    let merchant = app.create_user(AccountType::Merchant, "host@vista.test").await;
    app.grant(&merchant, &["merchant_role.create", "merchant_role.read"])
        .await;
    let token = app.token(&merchant);

    let (status, catalog) = app.send(empty_request("GET", "/permissions", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        catalog["data"]
            .as_array()
            .unwrap()
            .iter()
            .all(|p| p["userType"] == "merchant")
    );

    let (status, role) = app
        .send(json_request(
            "POST",
            "/roles",
            Some(&token),
            json!({
                "name": "Front Desk",
                "userType": "merchant",
                "permissionIds": ids(&catalog, &["homestay.update", "room_type.update"])
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(role["data"]["permissions"].as_array().unwrap().len(), 2);

    let (_, listed) = app.send(empty_request("GET", "/roles", Some(&token))).await;
    assert!(
        listed["data"]
            .as_array()
            .unwrap()
            .iter()
            .all(|r| r["userType"] == "merchant")
    );
}

#[tokio::test]
async fn test_role_cannot_hold_permissions_of_another_scope() {
    let app = spawn_app();
    let root = app.create_super_admin("root@vista.test").await;
    let token = app.token(&root);
    app.grant(&root, &[]).await;

    let (_, catalog) = app.send(empty_request("GET", "/permissions", Some(&token))).await;
    let (status, body) = app
        .send(json_request(
            "POST",
            "/roles",
            Some(&token),
            json!({
                "name": "Mixed",
                "userType": "merchant",
                "permissionIds": ids(&catalog, &["guide.delete"])
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "permissionIds");
}

#[tokio::test]
async fn test_role_names_are_unique() {
    let app = spawn_app();
    let root = app.create_super_admin("root@vista.test").await;
    let token = app.token(&root);
    let create = || {
        json_request(
            "POST",
            "/roles",
            Some(&token),
            json!({ "name": "Content Editors", "userType": "admin" }),
        )
    };

    let (status, _) = app.send(create()).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app.send(create()).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_only_super_admins_manage_system_roles() {
    let app = spawn_app();
    let admin = app.create_user(AccountType::Admin, "ops@vista.test").await;
    app.grant(&admin, &["role.create"]).await;

    let (status, _) = app
        .send(json_request(
            "POST",
            "/roles",
            Some(&app.token(&admin)),
            json!({ "name": "Platform Owners", "userType": "system" }),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_assigned_role_grants_access() {
    let app = spawn_app();
    let root = app.create_super_admin("root@vista.test").await;
    let root_token = app.token(&root);
    let editor = app.create_user(AccountType::Admin, "editor@vista.test").await;
    let editor_token = app.token(&editor);
    app.grant(&root, &[]).await;

    let (status, _) = app
        .send(json_request(
            "POST",
            "/events",
            Some(&editor_token),
            json!({ "name": "Vesak Lanterns" }),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, catalog) = app.send(empty_request("GET", "/permissions", Some(&root_token))).await;
    let (_, role) = app
        .send(json_request(
            "POST",
            "/roles",
            Some(&root_token),
            json!({
                "name": "Event Editors",
                "userType": "admin",
                "permissionIds": ids(&catalog, &["event.create"])
            }),
        ))
        .await;
    let role_id = role["data"]["id"].as_str().unwrap();

    let (status, assigned) = app
        .send(json_request(
            "PUT",
            &format!("/admin/users/{}/roles", editor.id),
            Some(&root_token),
            json!({ "roleIds": [role_id] }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(assigned["data"][0]["name"], "Event Editors");

    let (status, _) = app
        .send(json_request(
            "POST",
            "/events",
            Some(&editor_token),
            json!({ "name": "Vesak Lanterns" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_customers_hold_no_roles() {
    let app = spawn_app();
    let root = app.create_super_admin("root@vista.test").await;
    let customer = app.create_user(AccountType::Customer, "casey@vista.test").await;
    let token = app.token(&root);

    let (_, role) = app
        .send(json_request(
            "POST",
            "/roles",
            Some(&token),
            json!({ "name": "Support", "userType": "admin" }),
        ))
        .await;

    let (status, body) = app
        .send(json_request(
            "PUT",
            &format!("/admin/users/{}/roles", customer.id),
            Some(&token),
            json!({ "roleIds": [role["data"]["id"]] }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "roleIds");
    assert!(app.repo.user_roles(customer.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deleting_a_permission_unlinks_it_from_roles() {
    let app = spawn_app();
    let root = app.create_super_admin("root@vista.test").await;
    let token = app.token(&root);

    let (status, permission) = app
        .send(json_request(
            "POST",
            "/permissions",
            Some(&token),
            json!({ "category": "report", "name": "report.export", "userType": "admin" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let permission_id = permission["data"]["id"].as_str().unwrap().to_string();

    let (_, role) = app
        .send(json_request(
            "POST",
            "/roles",
            Some(&token),
            json!({ "name": "Analysts", "userType": "admin", "permissionIds": [permission_id] }),
        ))
        .await;
    let role_id = role["data"]["id"].as_str().unwrap();

    let (status, _) = app
        .send(empty_request("DELETE", &format!("/permissions/{}", permission_id), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, fetched) = app
        .send(empty_request("GET", &format!("/roles/{}", role_id), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(fetched["data"]["permissions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_cannot_deactivate_itself() {
    let app = spawn_app();
    let root = app.create_super_admin("root@vista.test").await;

    let (status, _) = app
        .send(json_request(
            "PATCH",
            &format!("/admin/users/{}/status", root.id),
            Some(&app.token(&root)),
            json!({ "value": false }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.repo.find_user(root.id, Visibility::Live).await.unwrap().is_some());
}

#[tokio::test]
async fn test_only_super_admins_create_super_admins() {
    let app = spawn_app();
    let admin = app.create_user(AccountType::Admin, "ops@vista.test").await;
    app.grant(&admin, &["user.create"]).await;
    let token = app.token(&admin);

    let (status, _) = app
        .send(json_request(
            "POST",
            "/admin/users",
            Some(&token),
            json!({
                "email": "boss@vista.test",
                "password": "long-enough-secret",
                "fullName": "Boss",
                "isSuperAdmin": true
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(json_request(
            "POST",
            "/admin/users",
            Some(&token),
            json!({
                "email": "colleague@vista.test",
                "password": "long-enough-secret",
                "fullName": "Colleague"
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["user"]["accountType"], "admin");
    assert_eq!(body["data"]["user"]["isSuperAdmin"], false);
}

#[tokio::test]
async fn test_user_list_filters_by_account_type() {
    let app = spawn_app();
    let root = app.create_super_admin("root@vista.test").await;
    app.create_user(AccountType::Merchant, "host@vista.test").await;
    app.create_user(AccountType::Customer, "casey@vista.test").await;

    let (status, body) = app
        .send(empty_request(
            "GET",
            "/admin/users?accountType=merchant",
            Some(&app.token(&root)),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["email"], "host@vista.test");
    assert_eq!(body["pagination"]["total"], 1);
}

#[tokio::test]
async fn test_merchant_cannot_touch_roles_it_did_not_build() {
    let app = spawn_app();
    let intruder = app.create_user(AccountType::Merchant, "intruder@vista.test").await;
    let host = app.create_user(AccountType::Merchant, "host@vista.test").await;
    app.grant(
        &intruder,
        &[
            "merchant_role.create",
            "merchant_role.read",
            "merchant_role.update",
            "merchant_role.delete",
        ],
    )
    .await;
    app.grant(&host, &["homestay.create", "merchant_role.create"]).await;
    let intruder_token = app.token(&intruder);
    let host_token = app.token(&host);

    // The host's admin-issued role, and one the host built.
    let issued = app.repo.user_roles(host.id).await.unwrap()[0].clone();
    let (status, built) = app
        .send(json_request(
            "POST",
            "/roles",
            Some(&host_token),
            json!({ "name": "Housekeeping", "userType": "merchant" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let built_id = built["data"]["id"].as_str().unwrap().to_string();

    for role_id in [issued.role.id.to_string(), built_id.clone()] {
        let uri = format!("/roles/{}", role_id);
        let (status, _) = app
            .send(json_request("PUT", &uri, Some(&intruder_token), json!({ "permissionIds": [] })))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND, "PUT {}", uri);
        let (status, _) = app.send(empty_request("DELETE", &uri, Some(&intruder_token))).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "DELETE {}", uri);
        let (status, _) = app.send(empty_request("GET", &uri, Some(&intruder_token))).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "GET {}", uri);
    }

    let (_, listed) = app.send(empty_request("GET", "/roles", Some(&intruder_token))).await;
    assert!(listed["data"].as_array().unwrap().iter().all(|r| r["id"] != built_id.as_str()));

    let untouched = app.repo.find_role(issued.role.id).await.unwrap().unwrap();
    assert_eq!(untouched.permissions, issued.permissions);
    let (status, _) = app
        .send(json_request("POST", "/homestays", Some(&host_token), json!({ "name": "Lakeview" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}
