//! 媒体文件：校验后移入媒体目录，并提供批量上传接口。

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::Json as JsonResponse;
use serde::Serialize;
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

use crate::app::ServerSettings;
use crate::auth::AuthUser;
use crate::config::UPLOAD_MAX_FILE_SIZE;
use crate::error::ApiError;
use crate::upload::{
    DEFAULT_MAX_FILE_SIZE, FormPayload, UploadedFile, generate_unique_filename,
    validate_file_size, validate_image, validate_video,
};

pub const MEDIA_URL_PREFIX: &str = "/uploads";

#[derive(Clone, Debug, Serialize)]
pub struct StoredMedia {
    pub url: String,
    pub filename: String,
    pub mimetype: String,
    pub size: u64,
}

#[derive(Serialize)]
pub struct UploadMediaResponse {
    success: bool,
    files: Vec<StoredMedia>,
}

/// 图片字段的校验错误信息；合法时返回 `None`。
pub fn check_image(file: &UploadedFile, label: &str) -> Option<String> {
    if !validate_image(Some(file)) {
        return Some(format!("{label} must be a JPEG, PNG, GIF or WebP image"));
    }
    if !validate_file_size(Some(file), DEFAULT_MAX_FILE_SIZE) {
        return Some(format!("{label} must be 10 MB or smaller"));
    }
    None
}

fn check_media(file: &UploadedFile) -> Option<String> {
    if validate_image(Some(file)) {
        return check_image(file, &file.name);
    }
    if validate_video(Some(file)) {
        if !validate_file_size(Some(file), UPLOAD_MAX_FILE_SIZE) {
            return Some(format!("{} must be 20 MB or smaller", file.name));
        }
        return None;
    }
    Some(format!("{} has an unsupported file type", file.name))
}

/// 以唯一文件名移入媒体目录。
pub async fn store_file(
    settings: &ServerSettings,
    file: &UploadedFile,
) -> Result<StoredMedia, ApiError> {
    let filename = generate_unique_filename(&file.name);
    file.persist_to(&settings.media_dir.join(&filename)).await?;
    Ok(StoredMedia {
        url: format!("{MEDIA_URL_PREFIX}/{filename}"),
        filename,
        mimetype: file.mimetype.clone(),
        size: file.size,
    })
}

/// 删除之前存储的媒体文件；URL 不属于媒体目录时忽略。
pub async fn remove_stored(settings: &ServerSettings, url: &str) {
    let Some(filename) = url
        .strip_prefix(MEDIA_URL_PREFIX)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|name| !name.is_empty() && !name.contains(['/', '\\']) && *name != "..")
    else {
        return;
    };
    let path = settings.media_dir.join(filename);
    if let Err(err) = fs::remove_file(&path).await
        && err.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = ?path, error = %err, "failed to remove media file");
    }
}

/// 批量上传图片或视频。
pub async fn upload_media(
    user: AuthUser,
    Extension(settings): Extension<Arc<ServerSettings>>,
    payload: FormPayload,
) -> Result<(StatusCode, JsonResponse<UploadMediaResponse>), ApiError> {
    let result = store_all(&settings, &payload).await;
    payload.discard_files().await;
    let files = result?;
    info!(user_id = %user.id, count = files.len(), "media uploaded");
    Ok((
        StatusCode::CREATED,
        JsonResponse(UploadMediaResponse {
            success: true,
            files,
        }),
    ))
}

async fn store_all(
    settings: &ServerSettings,
    payload: &FormPayload,
) -> Result<Vec<StoredMedia>, ApiError> {
    if payload.files.is_empty() {
        return Err(ApiError::Validation(vec!["No files were uploaded".into()]));
    }
    let messages: Vec<String> = payload.files.iter().filter_map(check_media).collect();
    if !messages.is_empty() {
        return Err(ApiError::Validation(messages));
    }

    let mut stored = Vec::with_capacity(payload.files.len());
    for file in &payload.files {
        match store_file(settings, file).await {
            Ok(media) => stored.push(media),
            Err(err) => {
                for media in &stored {
                    remove_stored(settings, &media.url).await;
                }
                return Err(err);
            }
        }
    }
    Ok(stored)
}
