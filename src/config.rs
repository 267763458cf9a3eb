//! CLI arguments and server configuration defaults.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

pub const API_PREFIX: &str = "/api/v1";
pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;
pub const UPLOAD_MAX_FILE_SIZE: u64 = 20 * 1024 * 1024;
pub const UPLOAD_MAX_FILES: usize = 40;
pub const UPLOAD_LIMIT_MESSAGE: &str = "File size limit has been reached";
pub const UPLOAD_TEMP_DIR_NAME: &str = "blogss-temp";
pub const DEV_CLIENT_ORIGIN: &str = "http://localhost:5173";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;
pub const DEFAULT_RATE_LIMIT_MAX: u32 = 100;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 15 * 60;
pub const DEFAULT_UPLOAD_TEMP_TTL_SECS: u64 = 0;
pub const DEFAULT_BCRYPT_COST: u32 = 12;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const RATE_LIMIT_PRUNE_INTERVAL_SECS: u64 = 300;
pub const UPLOAD_CLEAN_INTERVAL_SECS: u64 = 900;

/// 运行环境，决定 `.env` 文件、开发来源与错误细节的暴露。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }

    /// 读取 `APP_ENV`，在解析参数之前决定加载哪个 env 文件。
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV") {
            Ok(value) if value.eq_ignore_ascii_case("production") => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn env_file(self) -> &'static str {
        match self {
            Environment::Production => ".env.production",
            Environment::Development => ".env",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
        }
    }
}

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "blogss", version, about = "Blogss API server")]
pub struct Args {
    #[arg(
        short = 'b',
        long,
        env = "BLOGSS_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "PORT",
        default_value_t = DEFAULT_PORT,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "APP_ENV",
        value_enum,
        default_value_t = Environment::Development,
        help = "Runtime environment"
    )]
    pub environment: Environment,
    #[arg(long, env = "DATABASE_URL", help = "Database connection string")]
    pub database_url: Option<String>,
    #[arg(long, env = "CORS_ORIGIN", help = "Comma separated CORS origins")]
    pub cors_origins: Option<String>,
    #[arg(long, env = "JWT_SECRET", help = "Secret used to sign bearer tokens")]
    pub jwt_secret: String,
    #[arg(
        long,
        env = "JWT_TTL_SECS",
        default_value_t = DEFAULT_TOKEN_TTL_SECS,
        help = "Bearer token lifetime in seconds"
    )]
    pub token_ttl_secs: u64,
    #[arg(
        long,
        env = "BLOGSS_MEDIA_DIR",
        default_value = "uploads",
        help = "Directory for uploaded media"
    )]
    pub media_dir: PathBuf,
    #[arg(
        long,
        env = "BLOGSS_UPLOAD_TEMP_DIR",
        help = "Temp directory for buffered uploads (defaults to the OS temp dir)"
    )]
    pub upload_temp_dir: Option<PathBuf>,
    #[arg(
        long,
        env = "BLOGSS_UPLOAD_TEMP_TTL_SECS",
        default_value_t = DEFAULT_UPLOAD_TEMP_TTL_SECS,
        help = "Remove buffered uploads older than this many seconds (0 to disable)"
    )]
    pub upload_temp_ttl_secs: u64,
    #[arg(
        long,
        env = "BLOGSS_RATE_LIMIT_MAX",
        default_value_t = DEFAULT_RATE_LIMIT_MAX,
        help = "Max requests per client per window (0 to disable)"
    )]
    pub rate_limit_max: u32,
    #[arg(
        long,
        env = "BLOGSS_RATE_LIMIT_WINDOW_SECS",
        default_value_t = DEFAULT_RATE_LIMIT_WINDOW_SECS,
        help = "Rate limit window in seconds"
    )]
    pub rate_limit_window_secs: u64,
    #[arg(
        long,
        env = "BLOGSS_BCRYPT_COST",
        default_value_t = DEFAULT_BCRYPT_COST,
        help = "bcrypt cost for password hashing"
    )]
    pub bcrypt_cost: u32,
    #[arg(
        long,
        env = "BLOGSS_TRUST_PROXY",
        help = "Use the first x-forwarded-for hop as the client IP"
    )]
    pub trust_proxy: bool,
}

impl Args {
    /// 解析 CORS 白名单；非生产环境追加本地开发前端地址。
    pub fn cors_allow_list(&self) -> Vec<String> {
        let mut origins = parse_origins(self.cors_origins.as_deref());
        if !self.environment.is_production() && !origins.iter().any(|o| o == DEV_CLIENT_ORIGIN) {
            origins.push(DEV_CLIENT_ORIGIN.to_string());
        }
        origins
    }

    pub fn upload_temp_dir(&self) -> PathBuf {
        self.upload_temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(UPLOAD_TEMP_DIR_NAME))
    }
}

/// 逗号分隔的来源列表，忽略空项。
pub fn parse_origins(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}
