//! 上传文件的类型与大小校验，以及唯一文件名生成。

use chrono::Utc;
use rand::Rng;

use super::UploadedFile;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

pub const ALLOWED_IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
];

pub const ALLOWED_VIDEO_TYPES: &[&str] = &[
    "video/mp4",
    "video/avi",
    "video/mov",
    "video/wmv",
    "video/flv",
    "video/webm",
];

const RANDOM_TOKEN_LEN: usize = 13;

fn validate_file_type(file: Option<&UploadedFile>, allowed: &[&str]) -> bool {
    file.is_some_and(|file| !file.mimetype.is_empty() && allowed.contains(&file.mimetype.as_str()))
}

/// 声明的 MIME 类型是否为允许的图片类型（不做内容嗅探）。
pub fn validate_image(file: Option<&UploadedFile>) -> bool {
    validate_file_type(file, ALLOWED_IMAGE_TYPES)
}

/// 声明的 MIME 类型是否为允许的视频类型。
pub fn validate_video(file: Option<&UploadedFile>) -> bool {
    validate_file_type(file, ALLOWED_VIDEO_TYPES)
}

pub fn validate_file_size(file: Option<&UploadedFile>, max_size: u64) -> bool {
    file.is_some_and(|file| file.size <= max_size)
}

/// 生成 `<毫秒时间戳>_<随机串>.<原扩展名>` 形式的文件名。
pub fn generate_unique_filename(original_name: &str) -> String {
    let timestamp = Utc::now().timestamp_millis();
    let token = to_base36(rand::rng().random::<u64>());
    let token = &token[..token.len().min(RANDOM_TOKEN_LEN)];
    let extension = original_name.rsplit('.').next().unwrap_or(original_name);
    format!("{timestamp}_{token}.{extension}")
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
