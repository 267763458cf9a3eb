//! 共享上下文与路由装配。

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::{get, post};
use axum::{Router, middleware};
use axum_server::Handle;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info_span};

use crate::auth::TokenKeys;
use crate::config::{API_PREFIX, DEFAULT_BCRYPT_COST, Environment, MAX_BODY_SIZE};
use crate::db::Database;
use crate::error::expose_error_details;
use crate::http::{
    CorsAllowList, add_security_headers, enforce_cors_allow_list, resolve_client_ip,
};
use crate::media::MEDIA_URL_PREFIX;
use crate::rate_limit::{RateLimiter, rate_limit_middleware};
use crate::upload::UploadConfig;
use crate::{blogs, http, media, users};

/// 处理器通过 `Extension` 读取的运行参数。
#[derive(Clone, Debug)]
pub struct ServerSettings {
    pub environment: Environment,
    pub media_dir: PathBuf,
    pub bcrypt_cost: u32,
    /// 是否信任 `x-forwarded-for`；关闭时按连接地址识别客户端。
    pub trust_proxy: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            media_dir: PathBuf::from("uploads"),
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            trust_proxy: false,
        }
    }
}

/// 路由所需的全部共享状态。
#[derive(Clone)]
pub struct AppContext {
    pub db: Arc<Database>,
    pub tokens: Arc<TokenKeys>,
    pub upload: Arc<UploadConfig>,
    pub rate_limiter: Arc<RateLimiter>,
    pub cors: Arc<CorsAllowList>,
    pub settings: Arc<ServerSettings>,
}

fn api_routes() -> Router {
    Router::new()
        .route("/users/login", post(users::login))
        .route(
            "/users/signup",
            post(users::signup).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/users/profile",
            get(users::get_profile)
                .put(users::update_profile)
                .layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/blogs",
            get(blogs::list_blogs)
                .post(blogs::create_blog)
                .layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/blogs/{id}",
            get(blogs::get_blog)
                .put(blogs::update_blog)
                .delete(blogs::delete_blog)
                .layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/media/upload",
            post(media::upload_media).layer(DefaultBodyLimit::disable()),
        )
        .layer(middleware::from_fn(rate_limit_middleware))
}

/// 装配完整的应用路由与中间件栈。
pub fn build_router(ctx: &AppContext) -> Router {
    let mut app = Router::new()
        .route("/health", get(http::health))
        .nest(API_PREFIX, api_routes())
        .nest_service(MEDIA_URL_PREFIX, ServeDir::new(&ctx.settings.media_dir))
        .fallback(http::not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE));

    let trust_proxy = ctx.settings.trust_proxy;
    if !ctx.settings.environment.is_production() {
        app = app.layer(middleware::from_fn(expose_error_details));
    }

    app = app
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(move |request: &Request<_>| {
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip());
                    let client_ip =
                        resolve_client_ip(request.headers(), connect_ip, trust_proxy)
                            .map(|ip| ip.to_string())
                            .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(ctx.db.clone()))
        .layer(Extension(ctx.tokens.clone()))
        .layer(Extension(ctx.upload.clone()))
        .layer(Extension(ctx.rate_limiter.clone()))
        .layer(Extension(ctx.settings.clone()));

    if let Some(cors_layer) = ctx.cors.layer() {
        app = app.layer(cors_layer);
    }

    // 安全头放在最外层，CORS 拒绝的响应同样带上
    app.layer(middleware::from_fn(enforce_cors_allow_list))
        .layer(Extension(ctx.cors.clone()))
        .layer(middleware::from_fn(add_security_headers))
}

/// 在 `addr` 上提供服务；`handle` 触发优雅关闭后，等连接排空才返回。
pub async fn serve(app: Router, addr: SocketAddr, handle: Handle) -> std::io::Result<()> {
    axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await
}
