//! 上传文件：临时缓冲、校验、落盘与过期清理。

mod form;
mod validate;

pub use form::{FormPayload, buffer_multipart};
pub use validate::{
    ALLOWED_IMAGE_TYPES, ALLOWED_VIDEO_TYPES, DEFAULT_MAX_FILE_SIZE, generate_unique_filename,
    validate_file_size, validate_image, validate_video,
};

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub temp_dir: PathBuf,
    pub max_file_size: u64,
    pub max_files: usize,
    pub temp_ttl: Duration,
}

/// 已缓冲到临时目录的上传文件；由消费它的处理器负责移动或删除。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub field: String,
    pub name: String,
    pub mimetype: String,
    pub size: u64,
    pub temp_path: PathBuf,
}

impl UploadedFile {
    /// 移动到目标路径，按需创建父目录；跨设备时退化为复制后删除。
    pub async fn persist_to(&self, dest: &Path) -> Result<(), ApiError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        if let Err(err) = fs::rename(&self.temp_path, dest).await {
            debug!(error = %err, "rename failed, falling back to copy");
            fs::copy(&self.temp_path, dest).await?;
            self.discard().await;
        }
        debug!(from = ?self.temp_path, to = ?dest, "upload persisted");
        Ok(())
    }

    /// 删除临时文件。
    pub async fn discard(&self) {
        if let Err(err) = fs::remove_file(&self.temp_path).await
            && err.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = ?self.temp_path, error = %err, "failed to remove upload temp file");
        }
    }
}

/// 清理临时目录中超过 TTL 的缓冲文件。
pub async fn cleanup_upload_temp(upload: &UploadConfig) -> Result<(), std::io::Error> {
    if upload.temp_ttl.is_zero() {
        return Ok(());
    }
    if fs::metadata(&upload.temp_dir).await.is_err() {
        return Ok(());
    }

    let now = SystemTime::now();
    let mut dir = fs::read_dir(&upload.temp_dir).await?;
    while let Some(entry) = dir.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        let Ok(age) = now.duration_since(modified) else {
            continue;
        };
        if age >= upload.temp_ttl {
            let path = entry.path();
            if let Err(err) = fs::remove_file(&path).await {
                warn!(path = ?path, error = %err, "failed to remove stale upload temp file");
            } else {
                info!(path = ?path, "removed stale upload temp file");
            }
        }
    }

    Ok(())
}
