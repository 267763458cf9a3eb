//! 按客户端 IP 的固定窗口限流，并输出标准 `RateLimit-*` 响应头。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, connect_info::ConnectInfo};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

use crate::app::ServerSettings;
use crate::error::ApiError;
use crate::http::resolve_client_ip;

const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

#[derive(Debug)]
pub struct RateLimiter {
    pub max_requests: u32,
    pub window: Duration,
    clients: Mutex<HashMap<String, WindowEntry>>,
}

#[derive(Debug)]
struct WindowEntry {
    window_start: Instant,
    hits: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_secs: u64,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// 为 0 时关闭限流。
    pub fn is_enabled(&self) -> bool {
        self.max_requests > 0
    }

    /// 记录一次请求并返回当前窗口的额度。
    pub async fn hit(&self, client: &str) -> RateDecision {
        self.hit_at(client, Instant::now()).await
    }

    async fn hit_at(&self, client: &str, now: Instant) -> RateDecision {
        let mut clients = self.clients.lock().await;
        let entry = clients.entry(client.to_string()).or_insert(WindowEntry {
            window_start: now,
            hits: 0,
        });

        if now.duration_since(entry.window_start) >= self.window {
            entry.window_start = now;
            entry.hits = 0;
        }

        entry.hits = entry.hits.saturating_add(1);
        let reset_at = entry.window_start + self.window;
        let reset_secs = reset_at.saturating_duration_since(now).as_secs().max(1);
        RateDecision {
            allowed: entry.hits <= self.max_requests,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(entry.hits),
            reset_secs,
        }
    }

    /// 清理已过期的窗口。
    pub async fn prune(&self) {
        let mut clients = self.clients.lock().await;
        let now = Instant::now();
        clients.retain(|_, entry| now.duration_since(entry.window_start) < self.window);
    }

    #[cfg(test)]
    async fn tracked_clients(&self) -> usize {
        self.clients.lock().await.len()
    }
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    for (name, value) in [
        (RATE_LIMIT_LIMIT, u64::from(decision.limit)),
        (RATE_LIMIT_REMAINING, u64::from(decision.remaining)),
        (RATE_LIMIT_RESET, decision.reset_secs),
    ] {
        if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
            headers.insert(name, value);
        }
    }
}

/// 限流中间件：超出额度返回 429，所有响应附带额度头。
pub async fn rate_limit_middleware(
    Extension(limiter): Extension<Arc<RateLimiter>>,
    Extension(settings): Extension<Arc<ServerSettings>>,
    req: Request<AxumBody>,
    next: middleware::Next,
) -> Response {
    if !limiter.is_enabled() {
        return next.run(req).await;
    }

    let connect_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let client = resolve_client_ip(req.headers(), connect_ip, settings.trust_proxy)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let decision = limiter.hit(&client).await;
    let mut response = if decision.allowed {
        next.run(req).await
    } else {
        warn!(client_ip = %client, "rate limit exceeded");
        ApiError::TooManyRequests(decision.reset_secs).into_response()
    };
    apply_headers(response.headers_mut(), &decision);
    response
}
