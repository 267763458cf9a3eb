//! 认证流程：启动恢复、登录、注册、登出与资料更新。

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::failure::{AuthFailure, AuthResult, FailureKind};
use super::payload::Payload;
use super::session::{SessionStore, UserProfile};
use super::storage::TokenStore;
use crate::config::API_PREFIX;

pub const SIGNUP_SUCCESS_MESSAGE: &str = "Account created successfully! Please log in to continue.";
const INVALID_CREDENTIALS: &str = "Invalid Credentials";
const SIGNUP_FAILED: &str = "Signup failed";
const PROFILE_UPDATE_FAILED: &str = "Profile update failed";
const NETWORK_ERROR: &str = "Network error. Please try again.";
const PROFILE_FETCH_FAILED: &str = "Failed to fetch profile";
const PROFILE_FETCH_NETWORK_ERROR: &str = "Network error while fetching profile";
const NO_TOKEN: &str = "No token, authorization denied";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// 服务端根地址，例如 `http://localhost:5000`。
    pub base_url: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{API_PREFIX}{path}", self.base_url.trim_end_matches('/'))
    }
}

/// 客户端请求渲染层执行的跳转。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Navigation {
    Home,
    Login { message: String },
}

struct Reply {
    status: StatusCode,
    body: Option<Value>,
}

pub struct AuthClient {
    http: Client,
    config: ClientConfig,
    session: SessionStore,
    tokens: Arc<dyn TokenStore>,
    navigation: mpsc::UnboundedSender<Navigation>,
}

impl AuthClient {
    /// 读取持久化令牌；存在时拉取用户资料，否则直接结束加载。
    pub async fn bootstrap(
        config: ClientConfig,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Navigation>), reqwest::Error> {
        let http = Client::builder().timeout(config.timeout).build()?;
        let token = tokens.load().await.unwrap_or_else(|err| {
            warn!(error = %err, "failed to read persisted token");
            None
        });
        let (navigation, receiver) = mpsc::unbounded_channel();
        let client = Self {
            http,
            config,
            session: SessionStore::new(token),
            tokens,
            navigation,
        };

        if client.session.snapshot().token.is_some() {
            // 失败已记录在会话的 error 中
            let _ = client.fetch_user_profile().await;
        } else {
            client.session.finish();
        }
        Ok((client, receiver))
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn clear_error(&self) {
        self.session.set_error(None);
    }

    async fn send(&self, request: RequestBuilder) -> Result<Reply, reqwest::Error> {
        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        Ok(Reply {
            status,
            body: serde_json::from_slice(&bytes).ok(),
        })
    }

    /// 统一的加载与错误状态处理。
    async fn track(
        &self,
        operation: &'static str,
        outcome: impl Future<Output = AuthResult>,
    ) -> AuthResult {
        self.session.begin();
        let result = outcome.await;
        if let Err(failure) = &result {
            warn!(operation, kind = ?failure.kind, error = %failure, "auth operation failed");
            self.session.set_error(Some(failure.message()));
        }
        self.session.finish();
        result
    }

    pub async fn login(&self, email: &str, password: &str) -> AuthResult {
        self.track("login", self.do_login(email, password)).await
    }

    async fn do_login(&self, email: &str, password: &str) -> AuthResult {
        let request = self
            .http
            .post(self.config.endpoint("/users/login"))
            .json(&serde_json::json!({ "email": email, "password": password }));
        let reply = self.send(request).await.map_err(|err| {
            debug!(error = %err, "login request failed");
            AuthFailure::network(INVALID_CREDENTIALS)
        })?;

        if !reply.status.is_success() {
            return Err(AuthFailure::from_error_field(
                reply.status,
                reply.body.as_ref(),
                INVALID_CREDENTIALS,
            ));
        }

        let credentials = reply.body.and_then(|mut body| {
            let token = body.get("token")?.as_str()?.to_string();
            let user = serde_json::from_value::<UserProfile>(body.get_mut("user")?.take()).ok()?;
            Some((user, token))
        });
        let Some((user, token)) = credentials else {
            return Err(AuthFailure::network(INVALID_CREDENTIALS));
        };

        if let Err(err) = self.tokens.save(&token).await {
            warn!(error = %err, "failed to persist token");
        }
        self.session.set_credentials(user, token);
        Ok(())
    }

    /// 注册成功后跳转到登录页，不改变会话。
    pub async fn signup(&self, payload: Payload) -> AuthResult {
        self.track("signup", self.do_signup(payload)).await
    }

    async fn do_signup(&self, payload: Payload) -> AuthResult {
        let request = payload.attach(self.http.post(self.config.endpoint("/users/signup")))?;
        let reply = self.send(request).await.map_err(|err| {
            debug!(error = %err, "signup request failed");
            AuthFailure::network(NETWORK_ERROR)
        })?;

        if !reply.status.is_success() {
            return Err(AuthFailure::from_response(
                reply.status,
                reply.body.as_ref(),
                SIGNUP_FAILED,
            ));
        }
        // 成功状态但响应体不是 JSON，按网络错误处理
        if reply.body.is_none() {
            return Err(AuthFailure::network(NETWORK_ERROR));
        }

        self.navigate(Navigation::Login {
            message: SIGNUP_SUCCESS_MESSAGE.to_string(),
        });
        Ok(())
    }

    /// 清空会话与持久化令牌并跳转首页；重复调用无副作用差异。
    pub async fn logout(&self) {
        self.session.clear();
        if let Err(err) = self.tokens.remove().await {
            warn!(error = %err, "failed to remove persisted token");
        }
        self.navigate(Navigation::Home);
    }

    /// 401 会注销当前会话。
    pub async fn update_profile(&self, payload: Payload) -> AuthResult {
        self.track("update_profile", self.do_update_profile(payload)).await
    }

    async fn do_update_profile(&self, payload: Payload) -> AuthResult {
        let Some(token) = self.session.snapshot().token else {
            return Err(AuthFailure::unauthorized(NO_TOKEN));
        };
        let request = payload.attach(
            self.http
                .put(self.config.endpoint("/users/profile"))
                .bearer_auth(token),
        )?;
        let reply = self.send(request).await.map_err(|err| {
            debug!(error = %err, "profile update request failed");
            AuthFailure::network(NETWORK_ERROR)
        })?;

        if reply.status == StatusCode::UNAUTHORIZED {
            self.logout().await;
        }
        if !reply.status.is_success() {
            return Err(AuthFailure::from_response(
                reply.status,
                reply.body.as_ref(),
                PROFILE_UPDATE_FAILED,
            ));
        }

        let user = reply
            .body
            .and_then(|mut body| {
                serde_json::from_value::<UserProfile>(body.get_mut("user")?.take()).ok()
            })
            .ok_or_else(|| AuthFailure::network(NETWORK_ERROR))?;
        self.session.set_user(user);
        Ok(())
    }

    /// 用当前令牌拉取资料；401 注销，其余失败写入会话错误。始终结束加载。
    pub(crate) async fn fetch_user_profile(&self) -> AuthResult {
        let result = self.do_fetch_user_profile().await;
        match &result {
            Ok(()) => {}
            Err(failure) if failure.kind == FailureKind::Unauthorized => self.logout().await,
            Err(failure) => {
                warn!(kind = ?failure.kind, error = %failure, "profile fetch failed");
                self.session.set_error(Some(failure.message()));
            }
        }
        self.session.finish();
        result
    }

    async fn do_fetch_user_profile(&self) -> AuthResult {
        let Some(token) = self.session.snapshot().token else {
            return Err(AuthFailure::unauthorized(NO_TOKEN));
        };
        let request = self
            .http
            .get(self.config.endpoint("/users/profile"))
            .bearer_auth(token);
        let reply = self.send(request).await.map_err(|err| {
            debug!(error = %err, "profile request failed");
            AuthFailure::network(PROFILE_FETCH_NETWORK_ERROR)
        })?;

        if reply.status == StatusCode::UNAUTHORIZED {
            return Err(AuthFailure::from_error_field(
                reply.status,
                reply.body.as_ref(),
                NO_TOKEN,
            ));
        }
        if !reply.status.is_success() {
            return Err(AuthFailure::from_error_field(
                reply.status,
                None,
                PROFILE_FETCH_FAILED,
            ));
        }

        let user = reply
            .body
            .and_then(|body| serde_json::from_value::<UserProfile>(body).ok())
            .ok_or_else(|| AuthFailure::network(PROFILE_FETCH_NETWORK_ERROR))?;
        self.session.set_user(user);
        Ok(())
    }

    fn navigate(&self, target: Navigation) {
        if self.navigation.send(target).is_err() {
            debug!("navigation receiver dropped");
        }
    }
}
