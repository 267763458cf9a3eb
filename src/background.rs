//! 限流窗口清理与上传临时文件清理的后台任务。

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::{RATE_LIMIT_PRUNE_INTERVAL_SECS, UPLOAD_CLEAN_INTERVAL_SECS};
use crate::rate_limit::RateLimiter;
use crate::upload::{UploadConfig, cleanup_upload_temp};

/// 启动后台任务；上传临时文件清理仅在配置了 TTL 时运行。
pub fn spawn_background_tasks(rate_limiter: Arc<RateLimiter>, upload: Arc<UploadConfig>) {
    if rate_limiter.is_enabled() {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(RATE_LIMIT_PRUNE_INTERVAL_SECS));
            loop {
                interval.tick().await;
                rate_limiter.prune().await;
            }
        });
    }

    if !upload.temp_ttl.is_zero() {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(UPLOAD_CLEAN_INTERVAL_SECS));
            loop {
                interval.tick().await;
                if let Err(err) = cleanup_upload_temp(&upload).await {
                    warn!(error = %err, "upload temp cleanup failed");
                }
            }
        });
    }
}
