//! Blog post endpoint tests.
//!
//! Tests verify:
//! - Create, list, read, update and delete round through the router
//! - Malformed ids, missing posts and foreign authors are rejected
//! - Cover images are stored and cleaned up with the post

use axum::http::{Method, StatusCode};
use serde_json::json;

use super::test_utils::{Part, TestApp, body_json, get, json_request, multipart_request};

async fn create_post(app: &TestApp, token: &str, title: &str) -> String {
    let response = app
        .send(json_request(
            Method::POST,
            "/api/v1/blogs",
            json!({"title": title, "content": "Body text"}),
            Some(token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["blog"]["id"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_blog_crud_flow() {
    let app = TestApp::new().await;
    let token = app.register_and_login("Ada", "ada@example.com").await;

    let first = create_post(&app, &token, "First").await;
    let second = create_post(&app, &token, "Second").await;

    let response = app.send(get("/api/v1/blogs", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["count"], 2);
    let ids: Vec<&str> = body["blogs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|blog| blog["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&first.as_str()) && ids.contains(&second.as_str()));
    assert_eq!(body["blogs"][0]["authorName"], "Ada");

    let response = app
        .send(json_request(
            Method::PUT,
            &format!("/api/v1/blogs/{first}"),
            json!({"title": "First, edited"}),
            Some(&token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["blog"]["title"], "First, edited");
    assert_eq!(body["blog"]["content"], "Body text");

    let delete = axum::http::Request::builder()
        .method(Method::DELETE)
        .uri(format!("/api/v1/blogs/{first}"))
        .header("authorization", format!("Bearer {token}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.send(delete).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.send(get(&format!("/api/v1/blogs/{first}"), None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "Blog not found");
}

#[tokio::test]
async fn test_malformed_blog_id() {
    let app = TestApp::new().await;
    let response = app.send(get("/api/v1/blogs/123", None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Invalid ID format");
}

#[tokio::test]
async fn test_create_requires_title_and_content() {
    let app = TestApp::new().await;
    let token = app.register_and_login("Ada", "ada@example.com").await;
    let response = app
        .send(json_request(
            Method::POST,
            "/api/v1/blogs",
            json!({"title": ""}),
            Some(&token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["details"],
        json!(["Title is required", "Content is required"])
    );
}

#[tokio::test]
async fn test_create_requires_auth() {
    let app = TestApp::new().await;
    let response = app
        .send(json_request(
            Method::POST,
            "/api/v1/blogs",
            json!({"title": "t", "content": "c"}),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_only_author_may_edit() {
    let app = TestApp::new().await;
    let author = app.register_and_login("Ada", "ada@example.com").await;
    let other = app.register_and_login("Bob", "bob@example.com").await;
    let id = create_post(&app, &author, "Mine").await;

    let response = app
        .send(json_request(
            Method::PUT,
            &format!("/api/v1/blogs/{id}"),
            json!({"title": "Stolen"}),
            Some(&other),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_json(response).await["error"],
        "Not authorized to modify this blog"
    );

    let response = app.send(get(&format!("/api/v1/blogs/{id}"), None)).await;
    assert_eq!(body_json(response).await["blog"]["title"], "Mine");
}

#[tokio::test]
async fn test_cover_image_removed_with_post() {
    let app = TestApp::new().await;
    let token = app.register_and_login("Ada", "ada@example.com").await;

    let response = app
        .send(multipart_request(
            Method::POST,
            "/api/v1/blogs",
            &[
                Part::Text("title", "With cover"),
                Part::Text("content", "Body"),
                Part::File("coverImage", "cover.webp", "image/webp", b"RIFFfake"),
            ],
            Some(&token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let blog = body_json(response).await["blog"].clone();
    assert!(blog["coverImage"].as_str().unwrap().ends_with(".webp"));
    assert_eq!(app.media_files().len(), 1);

    let delete = axum::http::Request::builder()
        .method(Method::DELETE)
        .uri(format!("/api/v1/blogs/{}", blog["id"].as_str().unwrap()))
        .header("authorization", format!("Bearer {token}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.send(delete).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(app.media_files().is_empty());
}
