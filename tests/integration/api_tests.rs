//! HTTP edge and user endpoint tests.
//!
//! Tests verify:
//! - Health, 404 fallback and security headers
//! - CORS allow-list enforcement
//! - Signup, login and profile flows with the uniform error envelope
//! - Body size limits and rate limiting keyed on the client address

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::json;

use super::test_utils::{
    ALLOWED_ORIGIN, Part, TestApp, body_json, get, json_request, multipart_request,
};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

// =============================================================================
// Edge
// =============================================================================

#[tokio::test]
async fn test_health_reports_ok() {
    let app = TestApp::new().await;
    let response = app.send(get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let app = TestApp::new().await;
    let requests = [
        get("/health", None),
        get("/api/v1/nope", None),
        with_origin("https://evil.example"),
    ];
    for request in requests {
        let response = app.send(request).await;
        let headers = response.headers();
        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
        assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    }
}

#[tokio::test]
async fn test_unknown_api_route_echoes_path() {
    let app = TestApp::new().await;
    let response = app.send(get("/api/v1/does/not/exist", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "API endpoint not found");
    assert_eq!(body["path"], "/api/v1/does/not/exist");
}

#[tokio::test]
async fn test_unknown_page_is_plain_not_found() {
    let app = TestApp::new().await;
    let response = app.send(get("/somewhere", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "Not found");
}

// =============================================================================
// CORS
// =============================================================================

fn with_origin(origin: &str) -> Request<Body> {
    Request::builder()
        .uri("/health")
        .header(header::ORIGIN, origin)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_cors_rejects_unlisted_origin() {
    let app = TestApp::new().await;
    let response = app.send(with_origin("https://evil.example")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "Not allowed by CORS");
}

#[tokio::test]
async fn test_cors_allows_listed_origin() {
    let app = TestApp::new().await;
    let response = app.send(with_origin(ALLOWED_ORIGIN)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        ALLOWED_ORIGIN
    );
}

#[tokio::test]
async fn test_cors_allows_missing_origin() {
    let app = TestApp::new().await;
    let response = app.send(get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
}

// =============================================================================
// Users
// =============================================================================

#[tokio::test]
async fn test_signup_login_and_profile() {
    let app = TestApp::new().await;
    let response = app
        .send(json_request(
            Method::POST,
            "/api/v1/users/signup",
            json!({"name": "Ada", "email": "Ada@Example.com", "password": "secret1", "bio": "hi"}),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "User registered successfully");

    let response = app
        .send(json_request(
            Method::POST,
            "/api/v1/users/login",
            json!({"email": "ada@example.com", "password": "secret1"}),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let token = body["token"].as_str().unwrap().to_string();
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert!(body["user"].get("passwordHash").is_none());

    let response = app.send(get("/api/v1/users/profile", Some(&token))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let profile = body_json(response).await;
    assert_eq!(profile["name"], "Ada");
    assert_eq!(profile["bio"], "hi");
}

#[tokio::test]
async fn test_signup_accepts_urlencoded() {
    let app = TestApp::new().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/users/signup")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("name=Bob&email=bob%40example.com&password=secret1"))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_signup_validation_envelope() {
    let app = TestApp::new().await;
    let response = app
        .send(json_request(
            Method::POST,
            "/api/v1/users/signup",
            json!({"email": "nope", "password": "123"}),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Validation Error");
    assert_eq!(
        body["details"],
        json!([
            "Name is required",
            "Please include a valid email",
            "Password must be at least 6 characters"
        ])
    );
}

#[tokio::test]
async fn test_signup_duplicate_email() {
    let app = TestApp::new().await;
    app.register_and_login("Ada", "ada@example.com").await;

    let response = app
        .send(json_request(
            Method::POST,
            "/api/v1/users/signup",
            json!({"name": "Other", "email": "ADA@example.com", "password": "secret1"}),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "email already exists");
}

#[tokio::test]
async fn test_signup_with_avatar_stores_media() {
    let app = TestApp::new().await;
    let response = app
        .send(multipart_request(
            Method::POST,
            "/api/v1/users/signup",
            &[
                Part::Text("name", "Ada"),
                Part::Text("email", "ada@example.com"),
                Part::Text("password", "secret1"),
                Part::File("avatar", "me.png", "image/png", PNG),
            ],
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let media = app.media_files();
    assert_eq!(media.len(), 1);
    assert!(media[0].ends_with(".png"));
    assert_eq!(app.temp_files(), 0);
}

#[tokio::test]
async fn test_signup_rejects_non_image_avatar() {
    let app = TestApp::new().await;
    let response = app
        .send(multipart_request(
            Method::POST,
            "/api/v1/users/signup",
            &[
                Part::Text("name", "Ada"),
                Part::Text("email", "ada@example.com"),
                Part::Text("password", "secret1"),
                Part::File("avatar", "me.txt", "text/plain", b"hello"),
            ],
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.media_files().is_empty());
    assert_eq!(app.temp_files(), 0);
}

#[tokio::test]
async fn test_login_with_bad_password() {
    let app = TestApp::new().await;
    app.register_and_login("Ada", "ada@example.com").await;

    let response = app
        .send(json_request(
            Method::POST,
            "/api/v1/users/login",
            json!({"email": "ada@example.com", "password": "wrong-password"}),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body, json!({"success": false, "error": "Invalid Credentials"}));
}

#[tokio::test]
async fn test_profile_requires_token() {
    let app = TestApp::new().await;
    let response = app.send(get("/api/v1/users/profile", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(response).await["error"],
        "No token, authorization denied"
    );

    let response = app
        .send(get("/api/v1/users/profile", Some("not-a-jwt")))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Token is not valid");
}

#[tokio::test]
async fn test_update_profile_replaces_avatar() {
    let app = TestApp::new().await;
    let token = app.register_and_login("Ada", "ada@example.com").await;

    let upload = |name: &'static str| {
        multipart_request(
            Method::PUT,
            "/api/v1/users/profile",
            &[
                Part::Text("bio", "new bio"),
                Part::File("avatar", name, "image/png", PNG),
            ],
            Some(&token),
        )
    };

    let response = app.send(upload("one.png")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let first = body_json(response).await;
    assert_eq!(first["success"], true);
    assert_eq!(first["user"]["bio"], "new bio");
    let first_avatar = first["user"]["avatar"].as_str().unwrap().to_string();
    assert!(first_avatar.starts_with("/uploads/"));

    let response = app.send(upload("two.png")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let second = body_json(response).await;
    assert_ne!(second["user"]["avatar"], first["user"]["avatar"]);
    assert_eq!(app.media_files().len(), 1);

    let response = app.send(get(&first_avatar, None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = app
        .send(get(second["user"]["avatar"].as_str().unwrap(), None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_update_profile_rejects_empty_name() {
    let app = TestApp::new().await;
    let token = app.register_and_login("Ada", "ada@example.com").await;
    let response = app
        .send(json_request(
            Method::PUT,
            "/api/v1/users/profile",
            json!({"name": "   "}),
            Some(&token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["details"],
        json!(["Name cannot be empty"])
    );
}

// =============================================================================
// Limits
// =============================================================================

#[tokio::test]
async fn test_json_body_over_limit_is_rejected() {
    let app = TestApp::new().await;
    let oversized = "x".repeat(11 * 1024 * 1024);
    let response = app
        .send(json_request(
            Method::POST,
            "/api/v1/users/login",
            json!({"email": "a@b.com", "password": oversized}),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_rate_limit_blocks_after_max() {
    let app = TestApp::builder().rate_limit(2).build().await;
    for remaining in ["1", "0"] {
        let response = app.send(get("/api/v1/blogs", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("ratelimit-remaining").unwrap(), remaining);
    }

    let response = app.send(get("/api/v1/blogs", None)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().get(header::RETRY_AFTER).is_some());
    assert_eq!(body_json(response).await["error"], "Too many requests");

    // health sits outside the API prefix
    let response = app.send(get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

fn from_peer(forwarded_for: &str) -> Request<Body> {
    let mut request = Request::builder()
        .uri("/api/v1/blogs")
        .header("x-forwarded-for", forwarded_for)
        .body(Body::empty())
        .unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
    request
}

#[tokio::test]
async fn test_rate_limit_ignores_rotating_forwarded_for() {
    let app = TestApp::builder().rate_limit(2).build().await;
    for hop in ["10.0.0.1", "10.0.0.2"] {
        let response = app.send(from_peer(hop)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.send(from_peer("10.0.0.3")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_rate_limit_keys_on_forwarded_for_behind_trusted_proxy() {
    let app = TestApp::builder()
        .rate_limit(2)
        .trust_proxy(true)
        .build()
        .await;
    for hop in ["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.1"] {
        let response = app.send(from_peer(hop)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.send(from_peer("10.0.0.1")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}
