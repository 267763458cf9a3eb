//! Shared helpers: an app over an in-memory database and request builders.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use blogss::app::{AppContext, ServerSettings, build_router};
use blogss::auth::TokenKeys;
use blogss::config::{Environment, UPLOAD_MAX_FILE_SIZE, UPLOAD_MAX_FILES};
use blogss::db::Database;
use blogss::http::CorsAllowList;
use blogss::rate_limit::RateLimiter;
use blogss::upload::UploadConfig;

pub const TEST_SECRET: &str = "integration-test-secret";
pub const ALLOWED_ORIGIN: &str = "https://blog.example";
const BOUNDARY: &str = "blogss-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub ctx: AppContext,
    pub dir: TempDir,
}

pub struct TestAppBuilder {
    rate_limit_max: u32,
    environment: Environment,
    trust_proxy: bool,
}

impl TestAppBuilder {
    pub fn rate_limit(mut self, max: u32) -> Self {
        self.rate_limit_max = max;
        self
    }

    pub fn trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub async fn build(self) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect("sqlite::memory:", 1).await.unwrap();
        let ctx = AppContext {
            db: Arc::new(db),
            tokens: Arc::new(TokenKeys::new(TEST_SECRET, Duration::from_secs(3600))),
            upload: Arc::new(UploadConfig {
                temp_dir: dir.path().join("tmp"),
                max_file_size: UPLOAD_MAX_FILE_SIZE,
                max_files: UPLOAD_MAX_FILES,
                temp_ttl: Duration::ZERO,
            }),
            rate_limiter: Arc::new(RateLimiter::new(
                self.rate_limit_max,
                Duration::from_secs(900),
            )),
            cors: Arc::new(CorsAllowList::new(vec![ALLOWED_ORIGIN.to_string()])),
            settings: Arc::new(ServerSettings {
                environment: self.environment,
                media_dir: dir.path().join("media"),
                bcrypt_cost: 4,
                trust_proxy: self.trust_proxy,
            }),
        };
        TestApp {
            router: build_router(&ctx),
            ctx,
            dir,
        }
    }
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            rate_limit_max: 0,
            environment: Environment::Development,
            trust_proxy: false,
        }
    }

    pub async fn new() -> Self {
        Self::builder().build().await
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Registers a user and returns a bearer token for them.
    pub async fn register_and_login(&self, name: &str, email: &str) -> String {
        let signup = json_request(
            Method::POST,
            "/api/v1/users/signup",
            serde_json::json!({"name": name, "email": email, "password": "secret1"}),
            None,
        );
        let response = self.send(signup).await;
        assert_eq!(response.status(), 201);

        let login = json_request(
            Method::POST,
            "/api/v1/users/login",
            serde_json::json!({"email": email, "password": "secret1"}),
            None,
        );
        let response = self.send(login).await;
        assert_eq!(response.status(), 200);
        body_json(response).await["token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    pub fn media_files(&self) -> Vec<String> {
        match std::fs::read_dir(self.dir.path().join("media")) {
            Ok(entries) => entries
                .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn temp_files(&self) -> usize {
        match std::fs::read_dir(self.dir.path().join("tmp")) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(method: Method, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    /// field, file name, content type, bytes
    File(&'a str, &'a str, &'a str, &'a [u8]),
}

pub fn multipart_request(
    method: Method,
    uri: &str,
    parts: &[Part<'_>],
    token: Option<&str>,
) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File(name, file_name, content_type, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
