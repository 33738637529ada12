//! Tests for the admin endpoints (POST /api/generate, GET /api/admin/stats).

use axum::{body::Body, http::Request, http::StatusCode};
use serde_json::json;
use tower::ServiceExt;

#[path = "../common/mod.rs"]
mod common;
use common::*;

fn generate_request(key: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/generate")
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("X-API-Key", key);
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn test_generate_requires_admin_key() {
    let db = TestDb::new();
    let state = test_app_state(&db);
    let body = json!({ "email": "buyer@example.com" });

    for key in [None, Some("wrong-key"), Some("")] {
        let response = test_app(state.clone())
            .oneshot(generate_request(key, body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "key {:?}", key);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Unauthorized");
    }

    assert_eq!(queries::license_stats(&db.conn(), 10).unwrap().total_licenses, 0);
}

#[tokio::test]
async fn test_admin_locked_when_key_unset() {
    let db = TestDb::new();
    let state = app_state_with(&db, &test_config());

    let response = test_app(state)
        .oneshot(generate_request(Some(""), json!({ "email": "buyer@example.com" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_generate_issues_license() {
    let db = TestDb::new();
    let state = test_app_state(&db);

    let response = test_app(state.clone())
        .oneshot(generate_request(
            Some(TEST_ADMIN_KEY),
            json!({ "email": "buyer@example.com", "product_type": "Business", "days": 30 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["email"], "buyer@example.com");
    assert_eq!(json["data"]["product_type"], "business");
    assert_eq!(json["data"]["max_devices"], 10);
    assert_eq!(json["notification"], "skipped");
    let expires_at = json["data"]["expires_at"].as_i64().unwrap();
    let issued_at = json["data"]["issued_at"].as_i64().unwrap();
    assert_eq!(expires_at - issued_at, 30 * ONE_DAY);

    let code = json["activation_code"].as_str().unwrap();
    let stored = queries::find_license_by_code(&db.conn(), code).unwrap().unwrap();
    assert_eq!(stored.id, json["license_id"].as_str().unwrap());
}

#[tokio::test]
async fn test_generate_defaults_and_override() {
    let db = TestDb::new();
    let state = test_app_state(&db);

    let response = test_app(state)
        .oneshot(generate_request(
            Some(TEST_ADMIN_KEY),
            json!({ "email": "buyer@example.com", "max_devices": 1 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["product_type"], "personal");
    assert_eq!(json["data"]["max_devices"], 1);
    let days = (json["data"]["expires_at"].as_i64().unwrap()
        - json["data"]["issued_at"].as_i64().unwrap())
        / ONE_DAY;
    assert_eq!(days, 365);
}

#[tokio::test]
async fn test_generate_enterprise_uses_standard_limit() {
    let db = TestDb::new();
    let state = test_app_state(&db);

    let response = test_app(state)
        .oneshot(generate_request(
            Some(TEST_ADMIN_KEY),
            json!({ "email": "buyer@example.com", "product_type": "enterprise" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["product_type"], "enterprise");
    assert_eq!(json["data"]["max_devices"], 10);
}

#[tokio::test]
async fn test_generate_validation_errors() {
    let db = TestDb::new();
    let state = test_app_state(&db);

    for body in [
        json!({}),
        json!({ "email": "  " }),
        json!({ "email": "buyer@example.com", "product_type": "gold" }),
        json!({ "email": "buyer@example.com", "days": 0 }),
        json!({ "email": "buyer@example.com", "days": 9_000_000_000_000_000i64 }),
    ] {
        let response = test_app(state.clone())
            .oneshot(generate_request(Some(TEST_ADMIN_KEY), body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {}", body);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Bad request");
    }
}

#[tokio::test]
async fn test_stats() {
    let db = TestDb::new();
    let state = test_app_state(&db);
    let license = create_test_license(&state.activation, "a@example.com", Tier::Personal, None);
    create_test_license(&state.activation, "b@example.com", Tier::Business, None);
    state.activation.verify(&license.code, "dev-1", None).unwrap();

    let unauthorized = test_app(state.clone())
        .oneshot(
            Request::builder()
                .uri("/api/admin/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

    let response = test_app(state)
        .oneshot(
            Request::builder()
                .uri("/api/admin/stats")
                .header("X-API-Key", TEST_ADMIN_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["total_licenses"], 2);
    assert_eq!(json["used_licenses"], 1);
    assert_eq!(json["unused_licenses"], 1);
    assert_eq!(json["total_purchases"], 0);
    assert_eq!(json["recent_licenses"].as_array().unwrap().len(), 2);
}
