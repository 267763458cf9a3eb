//! 认证客户端：会话状态、令牌持久化以及登录、注册、资料更新流程。
//!
//! 界面渲染不在本模块范围内；页面跳转以 [`Navigation`] 事件的形式发出，
//! 由渲染层自行消费。

mod auth;
mod failure;
mod payload;
mod session;
mod storage;

pub use auth::{AuthClient, ClientConfig, Navigation, SIGNUP_SUCCESS_MESSAGE};
pub use failure::{AuthFailure, AuthResult, FailureKind};
pub use payload::{FilePart, Payload};
pub use session::{Session, SessionStore, UserProfile};
pub use storage::{FileTokenStore, MemoryTokenStore, TOKEN_KEY, TokenStore, TokenStoreError};
