//! Blogss：博客平台的 HTTP 服务端与配套的认证客户端。
//!
//! 服务端由 [`app::build_router`] 装配；[`client`] 模块提供会话存储与认证流程。

pub mod app;
pub mod auth;
pub mod background;
pub mod blogs;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod logging;
pub mod media;
pub mod rate_limit;
pub mod upload;
pub mod users;
