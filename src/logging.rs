//! 日志初始化：`RUST_LOG` 优先，否则按运行环境选择默认过滤规则。

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Environment;

/// 不同环境的默认过滤规则。
pub fn default_filter(environment: Environment) -> &'static str {
    match environment {
        Environment::Production => "info,sqlx=warn",
        Environment::Development => "debug,sqlx=warn,hyper=info",
    }
}

/// 初始化 tracing 日志订阅。
pub fn init_logging(environment: Environment) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(environment)));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(!environment.is_production()))
        .init();
}
