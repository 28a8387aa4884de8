mod common;

use axum::http::StatusCode;
use common::{empty_request, json_request, spawn_app};
use serde_json::json;
use travel_platform::models::AccountType;

#[tokio::test]
async fn test_title_alias_derives_slug_and_duplicate_is_conflict() {
    let app = spawn_app();
    let admin = app.create_super_admin("root@vista.test").await;
    let token = app.token(&admin);

    let (status, body) = app
        .send(json_request(
            "POST",
            "/activities",
            Some(&token),
            json!({ "title": "Sunset Kayak Tour", "city": "Kandy" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["slug"], "sunset-kayak-tour");
    assert_eq!(body["data"]["name"], "Sunset Kayak Tour");
    assert_eq!(body["data"]["isActive"], true);
    assert_eq!(body["data"]["vistaVerified"], false);

    let (status, body) = app
        .send(json_request(
            "POST",
            "/activities",
            Some(&token),
            json!({ "title": "Sunset Kayak Tour!!" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_same_slug_is_allowed_in_another_collection() {
    let app = spawn_app();
    let admin = app.create_super_admin("root@vista.test").await;
    let token = app.token(&admin);

    for path in ["/events", "/guides"] {
        let (status, body) = app
            .send(json_request("POST", path, Some(&token), json!({ "name": "Perahera Night" })))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", path);
        assert_eq!(body["data"]["slug"], "perahera-night");
    }
}

#[tokio::test]
async fn test_missing_name_is_a_validation_error() {
    let app = spawn_app();
    let admin = app.create_super_admin("root@vista.test").await;

    let (status, body) = app
        .send(json_request(
            "POST",
            "/events",
            Some(&app.token(&admin)),
            json!({ "city": "Galle" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["errors"]
            .as_array()
            .unwrap()
            .iter()
            .any(|e| e["field"] == "name")
    );
}

#[tokio::test]
async fn test_soft_delete_hides_row_and_restore_brings_it_back() {
    let app = spawn_app();
    let admin = app.create_super_admin("root@vista.test").await;
    let token = app.token(&admin);

    let (_, created) = app
        .send(json_request("POST", "/guides", Some(&token), json!({ "name": "Temple Trail" })))
        .await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .send(empty_request("DELETE", &format!("/guides/{}", id), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.send(empty_request("GET", &format!("/guides/{}", id), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, listed) = app.send(empty_request("GET", "/guides", None)).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 0);
    assert_eq!(listed["pagination"]["total"], 0);

    let (status, deleted) = app
        .send(empty_request("GET", "/guides/deleted", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["data"][0]["id"], id.as_str());

    // A second delete finds nothing live.
    let (status, _) = app
        .send(empty_request("DELETE", &format!("/guides/{}", id), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, restored) = app
        .send(empty_request("PATCH", &format!("/guides/restore/{}", id), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(restored["data"]["deletedAt"].is_null());

    let (status, fetched) = app.send(empty_request("GET", &format!("/guides/{}", id), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["data"]["slug"], "temple-trail");
}

#[tokio::test]
async fn test_restore_conflicts_when_slug_was_reused() {
    let app = spawn_app();
    let admin = app.create_super_admin("root@vista.test").await;
    let token = app.token(&admin);

    let (_, first) = app
        .send(json_request("POST", "/shoppings", Some(&token), json!({ "name": "Spice Market" })))
        .await;
    let first_id = first["data"]["id"].as_str().unwrap().to_string();
    app.send(empty_request("DELETE", &format!("/shoppings/{}", first_id), Some(&token)))
        .await;

    // The slug is free again once the first row is deleted.
    let (status, _) = app
        .send(json_request("POST", "/shoppings", Some(&token), json!({ "name": "Spice Market" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .send(empty_request("PATCH", &format!("/shoppings/restore/{}", first_id), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_restoring_a_live_row_is_rejected() {
    let app = spawn_app();
    let admin = app.create_super_admin("root@vista.test").await;
    let token = app.token(&admin);

    let (_, created) = app
        .send(json_request(
            "POST",
            "/local-artists",
            Some(&token),
            json!({ "name": "Mask Carver" }),
        ))
        .await;
    let id = created["data"]["id"].as_str().unwrap();

    let (status, _) = app
        .send(empty_request("PATCH", &format!("/local-artists/restore/{}", id), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_renaming_moves_the_slug() {
    let app = spawn_app();
    let admin = app.create_super_admin("root@vista.test").await;
    let token = app.token(&admin);

    let (_, created) = app
        .send(json_request(
            "POST",
            "/food-and-beverages",
            Some(&token),
            json!({ "name": "Hopper Hut" }),
        ))
        .await;
    let id = created["data"]["id"].as_str().unwrap();

    let (status, updated) = app
        .send(json_request(
            "PUT",
            &format!("/food-and-beverages/{}", id),
            Some(&token),
            json!({ "name": "Hopper House" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["slug"], "hopper-house");
}

#[tokio::test]
async fn test_status_toggle_inverts_without_body_and_sets_with_one() {
    let app = spawn_app();
    let admin = app.create_super_admin("root@vista.test").await;
    let token = app.token(&admin);

    let (_, created) = app
        .send(json_request("POST", "/events", Some(&token), json!({ "name": "Kite Festival" })))
        .await;
    let id = created["data"]["id"].as_str().unwrap();
    let uri = format!("/events/status/{}", id);

    let (status, toggled) = app.send(empty_request("PATCH", &uri, Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(toggled["data"]["isActive"], false);

    let (_, set) = app
        .send(json_request("PATCH", &uri, Some(&token), json!({ "value": false })))
        .await;
    assert_eq!(set["data"]["isActive"], false);

    let (_, verified) = app
        .send(empty_request("PATCH", &format!("/events/{}/verify", id), Some(&token)))
        .await;
    assert_eq!(verified["data"]["vistaVerified"], true);

    // Inactive rows are still listed; the filter narrows them.
    let (_, active_only) = app
        .send(empty_request("GET", "/events?isActive=true", None))
        .await;
    assert_eq!(active_only["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_admin_needs_the_collection_permission() {
    let app = spawn_app();
    let admin = app.create_user(AccountType::Admin, "ops@vista.test").await;
    let token = app.token(&admin);

    let (status, body) = app
        .send(json_request("POST", "/activities", Some(&token), json!({ "name": "Rafting" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["message"].as_str().unwrap().contains("activity.create"));

    app.grant(&admin, &["activity.create"]).await;
    let (status, _) = app
        .send(json_request("POST", "/activities", Some(&token), json!({ "name": "Rafting" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_customer_is_refused_on_content_writes() {
    let app = spawn_app();
    let customer = app.create_user(AccountType::Customer, "casey@vista.test").await;

    let (status, _) = app
        .send(json_request(
            "POST",
            "/guides",
            Some(&app.token(&customer)),
            json!({ "name": "Tea Country" }),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_merchants_manage_only_their_own_homestays() {
    let app = spawn_app();
    let owner = app.create_user(AccountType::Merchant, "owner@vista.test").await;
    let rival = app.create_user(AccountType::Merchant, "rival@vista.test").await;
    let permissions = ["homestay.create", "homestay.update", "homestay.delete"];
    app.grant(&owner, &permissions).await;
    app.grant(&rival, &permissions).await;

    let (status, created) = app
        .send(json_request(
            "POST",
            "/homestays",
            Some(&app.token(&owner)),
            json!({ "name": "Misty Ridge Villa", "details": { "rooms": 4 } }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["ownerId"], owner.id.to_string());
    assert_eq!(created["data"]["details"]["rooms"], 4);
    let id = created["data"]["id"].as_str().unwrap();

    let (status, _) = app
        .send(empty_request("DELETE", &format!("/homestays/{}", id), Some(&app.token(&rival))))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(empty_request("DELETE", &format!("/homestays/{}", id), Some(&app.token(&owner))))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_list_is_paginated() {
    let app = spawn_app();
    let admin = app.create_super_admin("root@vista.test").await;
    let token = app.token(&admin);

    for name in ["Alpha Walk", "Beta Walk", "Gamma Walk"] {
        app.send(json_request("POST", "/activities", Some(&token), json!({ "name": name })))
            .await;
    }

    let (status, page) = app
        .send(empty_request("GET", "/activities?page=2&limit=2", None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["data"].as_array().unwrap().len(), 1);
    assert_eq!(page["pagination"]["total"], 3);
    assert_eq!(page["pagination"]["totalPages"], 2);
    assert_eq!(page["pagination"]["page"], 2);
}

#[tokio::test]
async fn test_explicit_slug_with_stray_hyphens_is_rejected() {
    let app = spawn_app();
    let admin = app.create_super_admin("root@vista.test").await;
    let token = app.token(&admin);

    for slug in ["-", "-river-walk", "river-walk-", "river--walk"] {
        let (status, body) = app
            .send(json_request(
                "POST",
                "/activities",
                Some(&token),
                json!({ "name": "River Walk", "slug": slug }),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", slug);
        assert_eq!(body["errors"][0]["field"], "slug");
    }

    let (status, body) = app
        .send(json_request(
            "POST",
            "/activities",
            Some(&token),
            json!({ "name": "River Walk", "slug": "river-walk-2" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["slug"], "river-walk-2");
}
