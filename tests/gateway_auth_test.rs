// ============================================================================
// Gateway Auth Tests
// ============================================================================
//
// The auth gate in front of mounted services, and the in-process auth
// service behind /auth:
// - register -> login -> users/me
// - missing, invalid and expired tokens
// - inactive users
// - fail-open mode
// - x-user-id trust boundary
//
// ============================================================================

use axum::{body::Body, http::Request};
use chrono::Utc;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use tutor_gateway::{auth::TokenGrant, config::ServicesConfig};
use uuid::Uuid;

use test_utils::{sign_claims, spawn_app, spawn_mock_backend, test_config, TestApp, PASSWORD};

fn unique_email() -> String {
    format!("student_{}@example.com", Uuid::new_v4().simple())
}

async fn app_with_content_backend(fail_open: bool) -> TestApp {
    let mut config = test_config(ServicesConfig {
        content_url: Some(spawn_mock_backend("content").await),
        ..ServicesConfig::default()
    });
    config.gateway.fail_open = fail_open;
    spawn_app(config).await
}

#[tokio::test]
async fn test_register_login_and_fetch_current_user() {
    let app = spawn_app(test_config(ServicesConfig::default())).await;
    let email = unique_email();

    let response = app.register(&email).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let user: Value = response.json().await.unwrap();
    assert_eq!(user["email"], email.as_str());
    assert_eq!(user["is_active"], true);
    assert!(user.get("id").is_some());
    assert!(user.get("hashed_password").is_none());

    let response = app.login(&email, PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    let token: Value = response.json().await.unwrap();
    assert_eq!(token["token_type"], "bearer");
    let access_token = token["access_token"].as_str().unwrap();

    let response = app
        .client
        .get(app.url("/auth/users/me"))
        .bearer_auth(access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let me: Value = response.json().await.unwrap();
    assert_eq!(me["id"], user["id"]);
    assert_eq!(me["email"], email.as_str());

    let response = app.client.get(app.url("/auth/users/me")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["www-authenticate"], "Bearer");
}

#[tokio::test]
async fn test_registration_keeps_submitted_email_casing() {
    let app = spawn_app(test_config(ServicesConfig::default())).await;
    let email = format!("Student.{}@Example.com", Uuid::new_v4().simple());

    let response = app.register(&email).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let user: Value = response.json().await.unwrap();
    assert_eq!(user["email"], email.as_str());

    // lookups stay case-insensitive
    let response = app.login(&email.to_lowercase(), PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.register(&email.to_uppercase()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_registration_is_rejected() {
    let app = spawn_app(test_config(ServicesConfig::default())).await;
    let email = unique_email();

    assert_eq!(app.register(&email).await.status(), StatusCode::CREATED);

    let response = app.register(&email).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], "REGISTER_USER_ALREADY_EXISTS");
}

#[tokio::test]
async fn test_login_with_bad_credentials_is_rejected() {
    let app = spawn_app(test_config(ServicesConfig::default())).await;

    let response = app.login("nonexistent@example.com", "wrongpassword").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], "LOGIN_BAD_CREDENTIALS");
}

#[tokio::test]
async fn test_logout_is_stateless() {
    let app = spawn_app(test_config(ServicesConfig::default())).await;
    let email = unique_email();
    app.register(&email).await;
    let token: Value = app.login(&email, PASSWORD).await.json().await.unwrap();
    let access_token = token["access_token"].as_str().unwrap();

    let response = app
        .client
        .post(app.url("/auth/jwt/logout"))
        .bearer_auth(access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Still valid until it expires
    let response = app
        .client
        .get(app.url("/auth/users/me"))
        .bearer_auth(access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_auth_directory_and_openapi_are_public() {
    let app = spawn_app(test_config(ServicesConfig::default())).await;

    for path in ["/auth", "/auth/"] {
        let response = app.client.get(app.url(path)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", path);
        let body: Value = response.json().await.unwrap();
        assert!(body.get("message").is_some());
        assert!(body.get("endpoints").is_some());
    }

    let response = app
        .client
        .get(app.url("/auth/openapi.json"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let doc: Value = response.json().await.unwrap();
    for path in ["/register", "/jwt/login", "/jwt/logout", "/users/me"] {
        assert!(doc["paths"].get(path).is_some(), "missing {}", path);
    }
    assert!(doc.get("components").is_some());
}

#[tokio::test]
async fn test_issued_token_authenticates_against_other_services() {
    let app = app_with_content_backend(false).await;
    let email = unique_email();
    let user: Value = app.register(&email).await.json().await.unwrap();
    let token: Value = app.login(&email, PASSWORD).await.json().await.unwrap();

    let response = app
        .client
        .get(app.url("/content/lessons"))
        .bearer_auth(token["access_token"].as_str().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let echoed: Value = response.json().await.unwrap();
    assert_eq!(echoed["x_user_id"], user["id"]);
}

#[tokio::test]
async fn test_protected_path_without_token_is_rejected() {
    let app = app_with_content_backend(false).await;

    let response = app
        .client
        .get(app.url("/content/lessons"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], "MISSING_TOKEN");

    let response = app
        .client
        .get(app.url("/content/lessons"))
        .header("Authorization", "Basic dXNlcjpwYXNz")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], "MISSING_TOKEN");
}

#[tokio::test]
async fn test_invalid_and_expired_tokens_are_distinguished() {
    let app = app_with_content_backend(false).await;

    let response = app
        .client
        .get(app.url("/content/lessons"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], "INVALID_TOKEN");

    let expired = sign_claims(&json!({
        "sub": "user-42",
        "exp": Utc::now().timestamp() - 30,
    }));
    let response = app
        .client
        .get(app.url("/content/lessons"))
        .bearer_auth(expired)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], "EXPIRED_TOKEN");

    let no_subject = sign_claims(&json!({"exp": Utc::now().timestamp() + 60}));
    let response = app
        .client
        .get(app.url("/content/lessons"))
        .bearer_auth(no_subject)
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_inactive_user_is_forbidden() {
    let app = app_with_content_backend(false).await;
    let token = app.token_for(
        "user-42",
        &TokenGrant {
            is_active: false,
            ..TokenGrant::default()
        },
    );

    let response = app
        .client
        .get(app.url("/content/lessons"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], "INACTIVE_USER");
}

#[tokio::test]
async fn test_exempt_paths_ignore_garbage_tokens() {
    let app = app_with_content_backend(false).await;

    for path in ["/", "/health", "/content/health", "/openapi.json"] {
        let response = app
            .client
            .get(app.url(path))
            .bearer_auth("garbage")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", path);
    }
}

#[tokio::test]
async fn test_fail_open_forwards_without_identity() {
    let app = app_with_content_backend(true).await;

    let response = app
        .client
        .get(app.url("/content/lessons"))
        .bearer_auth("not-a-jwt")
        .header("x-user-id", "admin")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let echoed: Value = response.json().await.unwrap();
    assert_eq!(echoed["service"], "content");
    assert_eq!(echoed["x_user_id"], Value::Null);
}

#[tokio::test]
async fn test_client_supplied_user_id_is_replaced() {
    let app = app_with_content_backend(false).await;

    let response = app
        .client
        .get(app.url("/content/lessons"))
        .bearer_auth(app.valid_token())
        .header("x-user-id", "admin")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let echoed: Value = response.json().await.unwrap();
    assert_eq!(echoed["x_user_id"], "user-42");
    assert!(echoed["x_request_id"].is_string());
}

#[tokio::test]
async fn test_dot_segments_cannot_escape_exempt_prefixes() {
    for fail_open in [false, true] {
        let mut config = test_config(ServicesConfig {
            content_url: Some(spawn_mock_backend("content").await),
            auth_url: Some(spawn_mock_backend("auth").await),
            ..ServicesConfig::default()
        });
        config.gateway.fail_open = fail_open;
        config.gateway.exempt_prefixes.push("/content/public".to_string());
        let app = tutor_gateway::build_app(Arc::new(config)).unwrap();

        for path in [
            "/auth/register/../users/me",
            "/content/public/../admin/grades",
            "/content/public/%2e%2e/admin/grades",
            "/content/health/./../admin",
        ] {
            let request = Request::builder().uri(path).body(Body::empty()).unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(
                response.status().as_u16(),
                400,
                "{} (fail_open={})",
                path,
                fail_open
            );
        }

        // the exempt prefix itself still works
        let request = Request::builder()
            .uri("/content/public/syllabus")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }
}
