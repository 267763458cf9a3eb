//! 可订阅的会话状态。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::watch;

/// 服务端返回的用户对象，客户端只整体保存或替换，不解析字段。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile(pub Map<String, Value>);

impl UserProfile {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Session {
    pub user: Option<UserProfile>,
    pub token: Option<String>,
    pub loading: bool,
    pub error: Option<String>,
}

impl Session {
    /// 用户与令牌同时存在才算已登录。
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.token.is_some()
    }
}

/// 基于 `watch` 通道的会话存储；只有认证客户端可以修改。
#[derive(Debug)]
pub struct SessionStore {
    tx: watch::Sender<Session>,
}

impl SessionStore {
    pub(crate) fn new(token: Option<String>) -> Self {
        let (tx, _) = watch::channel(Session {
            token,
            loading: true,
            ..Session::default()
        });
        Self { tx }
    }

    pub fn snapshot(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    fn update(&self, apply: impl FnOnce(&mut Session)) {
        self.tx.send_modify(apply);
    }

    /// 操作开始：进入加载状态并清除上一次的错误。
    pub(crate) fn begin(&self) {
        self.update(|session| {
            session.loading = true;
            session.error = None;
        });
    }

    pub(crate) fn finish(&self) {
        self.update(|session| session.loading = false);
    }

    pub(crate) fn set_error(&self, message: Option<String>) {
        self.update(|session| session.error = message);
    }

    pub(crate) fn set_user(&self, user: UserProfile) {
        self.update(|session| {
            session.user = Some(user);
            session.error = None;
        });
    }

    pub(crate) fn set_credentials(&self, user: UserProfile, token: String) {
        self.update(|session| {
            session.user = Some(user);
            session.token = Some(token);
            session.error = None;
        });
    }

    /// 清空用户、令牌与错误，保留加载状态。
    pub(crate) fn clear(&self) {
        self.update(|session| {
            session.user = None;
            session.token = None;
            session.error = None;
        });
    }
}
