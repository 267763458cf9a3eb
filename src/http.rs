//! HTTP 边缘辅助：CORS 白名单、安全头、客户端 IP、健康检查与 404 兜底。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, OriginalUri};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, header};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use axum::middleware;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::error::ApiError;

/// 精确匹配的跨域来源白名单。
#[derive(Clone, Debug, Default)]
pub struct CorsAllowList {
    origins: Vec<String>,
}

impl CorsAllowList {
    pub fn new(origins: Vec<String>) -> Self {
        Self { origins }
    }

    /// 没有 `Origin` 的请求（curl、移动端）一律放行。
    pub fn permits(&self, origin: Option<&str>) -> bool {
        match origin {
            None => true,
            Some(origin) => self.origins.iter().any(|allowed| allowed == origin),
        }
    }

    /// 为白名单内的来源生成 CORS 响应头。
    pub fn layer(&self) -> Option<CorsLayer> {
        let origins = self
            .origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin, "invalid cors origin");
                    None
                }
            })
            .collect::<Vec<_>>();

        if origins.is_empty() {
            return None;
        }

        Some(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any),
        )
    }
}

/// 拒绝不在白名单中的跨域来源，而不是静默丢弃 CORS 头。
pub async fn enforce_cors_allow_list(
    Extension(allow_list): Extension<Arc<CorsAllowList>>,
    request: Request<AxumBody>,
    next: middleware::Next,
) -> Result<Response, ApiError> {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .map(|value| value.to_str().unwrap_or_default());
    if !allow_list.permits(origin) {
        warn!(origin = origin.unwrap_or_default(), "origin rejected by cors");
        return Err(ApiError::CorsRejected);
    }
    Ok(next.run(request).await)
}

/// 从 `x-forwarded-for` 解析客户端 IP。
pub fn extract_forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<IpAddr>().ok())
}

/// 计算客户端 IP：默认取连接地址，仅在信任反向代理时采用 `x-forwarded-for`。
pub fn resolve_client_ip(
    headers: &HeaderMap,
    connect_ip: Option<IpAddr>,
    trust_proxy: bool,
) -> Option<IpAddr> {
    if trust_proxy {
        extract_forwarded_ip(headers).or(connect_ip)
    } else {
        connect_ip
    }
}

const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("x-frame-options", "DENY"),
    ("x-content-type-options", "nosniff"),
    ("referrer-policy", "no-referrer"),
    ("x-dns-prefetch-control", "off"),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "cross-origin"),
    (
        "strict-transport-security",
        "max-age=15552000; includeSubDomains",
    ),
];

/// 添加基础安全响应头。
pub async fn add_security_headers(
    request: Request<AxumBody>,
    next: middleware::Next,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers.insert(
            HeaderName::from_static(*name),
            HeaderValue::from_static(*value),
        );
    }
    response
}

#[derive(Serialize)]
pub struct HealthStatus {
    status: &'static str,
    timestamp: String,
}

/// 健康检查。
pub async fn health() -> JsonResponse<HealthStatus> {
    JsonResponse(HealthStatus {
        status: "ok",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

/// 未匹配路由的兜底，回显请求路径。
pub async fn not_found(OriginalUri(uri): OriginalUri) -> Response {
    let path = uri.path().to_string();
    let api = path == "/api" || path.starts_with("/api/");
    ApiError::RouteNotFound { path, api }.into_response()
}
