//! Integration tests for authentication endpoints.

mod common;

use axum::http::StatusCode;
use cadence::db::models::UserRole;
use common::TestApp;

#[tokio::test]
async fn test_register_success() {
    let app = TestApp::new().await;

    let response = app
        .server()
        .post("/api/auth/register")
        .json(&serde_json::json!({
            "username": "ana",
            "email": "ana@example.com",
            "password": "password123"
        }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(body["user"]["username"], "ana");
    assert_eq!(body["user"]["email"], "ana@example.com");
    assert_eq!(body["user"]["role"], "user");
    assert!(body["user"].get("password_hash").is_none());

    // The returned token works on protected routes
    let (name, value) = app.auth_header(body["token"].as_str().unwrap());
    app.server()
        .get("/api/user/profile")
        .add_header(name, value)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_register_author_role() {
    let app = TestApp::new().await;

    let response = app
        .server()
        .post("/api/auth/register")
        .json(&serde_json::json!({
            "username": "writer",
            "email": "writer@example.com",
            "password": "password123",
            "role": "author"
        }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["user"]["role"], "author");
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let app = TestApp::new().await;
    app.create_test_user("ana", "ana@example.com", "password123", UserRole::User)
        .await;

    let response = app
        .server()
        .post("/api/auth/register")
        .json(&serde_json::json!({
            "username": "other",
            "email": "ANA@example.com",
            "password": "password123"
        }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn test_register_cannot_self_assign_admin() {
    let app = TestApp::new().await;

    let response = app
        .server()
        .post("/api/auth/register")
        .json(&serde_json::json!({
            "username": "mallory",
            "email": "mallory@example.com",
            "password": "password123",
            "role": "admin"
        }))
        .await;

    response.assert_status_forbidden();
}

#[tokio::test]
async fn test_register_validation() {
    let app = TestApp::new().await;

    let cases = [
        serde_json::json!({"email": "a@example.com", "password": "password123"}),
        serde_json::json!({"username": "a", "password": "password123"}),
        serde_json::json!({"username": "a", "email": "a@example.com"}),
        serde_json::json!({"username": "a", "email": "a@example.com", "password": "short"}),
        serde_json::json!({"username": "a", "email": "not-an-email", "password": "password123"}),
    ];

    for body in cases {
        let response = app.server().post("/api/auth/register").json(&body).await;
        response.assert_status_bad_request();
    }
}

#[tokio::test]
async fn test_login_success() {
    let app = TestApp::new().await;
    let user_id = app
        .create_test_user("ana", "ana@example.com", "password123", UserRole::User)
        .await;

    let response = app
        .server()
        .post("/api/auth/login")
        .json(&serde_json::json!({
            "email": "ana@example.com",
            "password": "password123"
        }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["user"]["id"], user_id);

    let claims = app
        .auth_service()
        .verify_token(body["token"].as_str().unwrap())
        .expect("Token should be valid");
    assert_eq!(claims.sub, user_id);
    assert_eq!(claims.role, UserRole::User);
}

#[tokio::test]
async fn test_login_wrong_password() {
    let app = TestApp::new().await;
    app.create_test_user("ana", "ana@example.com", "password123", UserRole::User)
        .await;

    let response = app
        .server()
        .post("/api/auth/login")
        .json(&serde_json::json!({
            "email": "ana@example.com",
            "password": "wrongpassword"
        }))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn test_login_nonexistent_user() {
    let app = TestApp::new().await;

    let response = app
        .server()
        .post("/api/auth/login")
        .json(&serde_json::json!({
            "email": "nobody@example.com",
            "password": "password123"
        }))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn test_login_missing_fields() {
    let app = TestApp::new().await;

    let response = app
        .server()
        .post("/api/auth/login")
        .json(&serde_json::json!({ "email": "ana@example.com" }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let app = TestApp::new().await;

    app.server()
        .get("/api/playlist")
        .await
        .assert_status_unauthorized();

    let (name, value) = app.auth_header("invalid-token-xyz");
    app.server()
        .get("/api/playlist")
        .add_header(name, value)
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn test_unknown_route_returns_json_404() {
    let app = TestApp::new().await;

    let response = app.server().get("/api/nothing-here").await;

    response.assert_status_not_found();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "not_found");
}
