//! Blogss server binary.
//!
//! Loads the environment file, connects the database, builds the Axum router
//! and serves it until a termination signal arrives.

use axum_server::Handle;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

use blogss::app::{AppContext, ServerSettings, build_router, serve};
use blogss::auth::TokenKeys;
use blogss::background::spawn_background_tasks;
use blogss::config::{
    Args, DEFAULT_DB_MAX_CONNECTIONS, Environment, UPLOAD_MAX_FILE_SIZE, UPLOAD_MAX_FILES,
};
use blogss::db::Database;
use blogss::http::CorsAllowList;
use blogss::logging;
use blogss::rate_limit::RateLimiter;
use blogss::upload::UploadConfig;

/// Starts the Blogss server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let env_file = Environment::from_env().env_file();
    let env_loaded = dotenvy::from_filename(env_file).is_ok();

    let args = Args::parse();
    logging::init_logging(args.environment);
    if !env_loaded {
        warn!(file = env_file, "env file not loaded");
    }

    let Some(database_url) = args.database_url.as_deref() else {
        error!("FATAL ERROR: DATABASE_URL is not defined.");
        std::process::exit(1);
    };
    let db = match Database::connect(database_url, DEFAULT_DB_MAX_CONNECTIONS).await {
        Ok(db) => Arc::new(db),
        Err(err) => {
            error!(error = %err, "FATAL ERROR: database connection failed");
            std::process::exit(1);
        }
    };

    let upload = Arc::new(UploadConfig {
        temp_dir: args.upload_temp_dir(),
        max_file_size: UPLOAD_MAX_FILE_SIZE,
        max_files: UPLOAD_MAX_FILES,
        temp_ttl: Duration::from_secs(args.upload_temp_ttl_secs),
    });
    tokio::fs::create_dir_all(&upload.temp_dir).await?;
    tokio::fs::create_dir_all(&args.media_dir).await?;

    let ctx = AppContext {
        db: db.clone(),
        tokens: Arc::new(TokenKeys::new(
            &args.jwt_secret,
            Duration::from_secs(args.token_ttl_secs),
        )),
        upload: upload.clone(),
        rate_limiter: Arc::new(RateLimiter::new(
            args.rate_limit_max,
            Duration::from_secs(args.rate_limit_window_secs),
        )),
        cors: Arc::new(CorsAllowList::new(args.cors_allow_list())),
        settings: Arc::new(ServerSettings {
            environment: args.environment,
            media_dir: args.media_dir.clone(),
            bcrypt_cost: args.bcrypt_cost,
            trust_proxy: args.trust_proxy,
        }),
    };
    spawn_background_tasks(ctx.rate_limiter.clone(), upload);
    let app = build_router(&ctx);

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let handle = Handle::new();

    info!(
        environment = args.environment.as_str(),
        "🚀 Server running on port {}", args.port
    );

    tokio::spawn(shutdown_signal(handle.clone()));
    serve(app, addr, handle).await?;

    db.close().await;
    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
