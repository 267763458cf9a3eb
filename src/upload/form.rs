//! 表单负载提取：multipart 写入临时目录，JSON / urlencoded 直接解析为字段。

use axum::Form;
use axum::body::{Body as AxumBody, to_bytes};
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::{Request as HttpRequest, header};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{UploadConfig, UploadedFile};
use crate::config::{MAX_BODY_SIZE, UPLOAD_LIMIT_MESSAGE};
use crate::error::ApiError;

/// 按 `Content-Type` 解析出的请求负载：文本字段加上已缓冲的文件。
#[derive(Debug, Default)]
pub struct FormPayload {
    pub fields: HashMap<String, String>,
    pub files: Vec<UploadedFile>,
}

impl FormPayload {
    /// 去除首尾空白后的字段值，空串视为缺失。
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// 指定字段名的第一个文件。
    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|file| file.field == field)
    }

    /// 删除所有仍留在临时目录的文件；已 `persist_to` 的文件会被安静跳过。
    pub async fn discard_files(self) {
        for file in &self.files {
            file.discard().await;
        }
    }
}

impl<S> FromRequest<S> for FormPayload
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let upload = req
                .extensions()
                .get::<Arc<UploadConfig>>()
                .cloned()
                .ok_or_else(|| ApiError::internal("upload config missing"))?;
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
            return buffer_multipart(multipart, &upload).await;
        }

        let (parts, body) = req.into_parts();
        let bytes = to_bytes(body, MAX_BODY_SIZE)
            .await
            .map_err(|_| ApiError::PayloadTooLarge("request entity too large".into()))?;

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let req = HttpRequest::from_parts(parts, AxumBody::from(bytes));
            let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
            return Ok(FormPayload {
                fields,
                files: Vec::new(),
            });
        }

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(FormPayload::default());
        }

        if content_type.is_empty() || content_type.starts_with("application/json") {
            let object: serde_json::Map<String, Value> = serde_json::from_slice(&bytes)
                .map_err(|err| ApiError::BadRequest(format!("invalid JSON body: {err}")))?;
            let fields = object
                .into_iter()
                .filter_map(|(key, value)| match value {
                    Value::Null => None,
                    Value::String(text) => Some((key, text)),
                    other => Some((key, other.to_string())),
                })
                .collect();
            return Ok(FormPayload {
                fields,
                files: Vec::new(),
            });
        }

        Err(ApiError::BadRequest(format!(
            "unsupported content type: {content_type}"
        )))
    }
}

/// 逐个读取 multipart 字段；文件流式写入临时目录，超限立即中止。
///
/// 中止时本次请求已缓冲的文件会被删除；成功返回的文件不会自动清理。
pub async fn buffer_multipart(
    mut multipart: Multipart,
    config: &UploadConfig,
) -> Result<FormPayload, ApiError> {
    let mut payload = FormPayload::default();
    match collect_fields(&mut multipart, config, &mut payload).await {
        Ok(()) => {
            debug!(
                fields = payload.fields.len(),
                files = payload.files.len(),
                "multipart buffered"
            );
            Ok(payload)
        }
        Err(err) => {
            payload.discard_files().await;
            Err(err)
        }
    }
}

async fn collect_fields(
    multipart: &mut Multipart,
    config: &UploadConfig,
    payload: &mut FormPayload,
) -> Result<(), ApiError> {
    fs::create_dir_all(&config.temp_dir).await?;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);

        let Some(file_name) = file_name else {
            let text = read_text_field(&mut field).await?;
            payload.fields.insert(name, text);
            continue;
        };
        if file_name.is_empty() {
            continue;
        }

        if config.max_files > 0 && payload.files.len() >= config.max_files {
            warn!(max_files = config.max_files, "upload file count limit reached");
            return Err(ApiError::PayloadTooLarge(UPLOAD_LIMIT_MESSAGE.into()));
        }

        let mimetype = field.content_type().unwrap_or_default().to_string();
        let temp_path = config.temp_dir.join(format!("tmp-{}", Uuid::new_v4()));
        let size = match write_field_to(&mut field, &temp_path, config.max_file_size).await {
            Ok(size) => size,
            Err(err) => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(err);
            }
        };

        payload.files.push(UploadedFile {
            field: name,
            name: file_name,
            mimetype,
            size,
            temp_path,
        });
    }

    Ok(())
}

async fn write_field_to(
    field: &mut Field<'_>,
    path: &Path,
    max_size: u64,
) -> Result<u64, ApiError> {
    let mut file = File::create(path).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        written += chunk.len() as u64;
        if max_size > 0 && written > max_size {
            warn!(max_size, "upload file size limit reached");
            return Err(ApiError::PayloadTooLarge(UPLOAD_LIMIT_MESSAGE.into()));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(written)
}

async fn read_text_field(field: &mut Field<'_>) -> Result<String, ApiError> {
    let mut buffer = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if buffer.len() + chunk.len() > MAX_BODY_SIZE {
            return Err(ApiError::PayloadTooLarge("request entity too large".into()));
        }
        buffer.extend_from_slice(&chunk);
    }
    String::from_utf8(buffer).map_err(|_| ApiError::BadRequest("form field is not UTF-8".into()))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(UPLOAD_LIMIT_MESSAGE.into())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}
