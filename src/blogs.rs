//! 博客文章的增删改查。

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::response::Json as JsonResponse;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::app::ServerSettings;
use crate::auth::AuthUser;
use crate::db::{BlogChanges, BlogRecord, Database, NewBlog};
use crate::error::ApiError;
use crate::media::{check_image, remove_stored, store_file};
use crate::upload::FormPayload;

const MAX_TITLE_LEN: usize = 200;
const COVER_FIELD: &str = "coverImage";

#[derive(Serialize)]
pub struct BlogListResponse {
    success: bool,
    count: usize,
    blogs: Vec<BlogRecord>,
}

#[derive(Serialize)]
pub struct BlogResponse {
    success: bool,
    blog: BlogRecord,
}

/// 解析 UUID 形式的文章 ID。
fn parse_blog_id(raw: &str) -> Result<String, ApiError> {
    Uuid::parse_str(raw)
        .map(|id| id.to_string())
        .map_err(|_| ApiError::InvalidId)
}

async fn load_blog(db: &Database, id: &str) -> Result<BlogRecord, ApiError> {
    db.find_blog(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Blog not found".into()))
}

async fn load_owned_blog(db: &Database, id: &str, user: &AuthUser) -> Result<BlogRecord, ApiError> {
    let blog = load_blog(db, id).await?;
    if blog.author_id != user.id {
        return Err(ApiError::Forbidden(
            "Not authorized to modify this blog".into(),
        ));
    }
    Ok(blog)
}

fn title_error(title: &str) -> Option<String> {
    (title.chars().count() > MAX_TITLE_LEN)
        .then(|| format!("Title must be {MAX_TITLE_LEN} characters or fewer"))
}

fn cover_error(payload: &FormPayload) -> Option<String> {
    payload
        .file(COVER_FIELD)
        .and_then(|cover| check_image(cover, "Cover image"))
}

pub async fn list_blogs(
    Extension(db): Extension<Arc<Database>>,
) -> Result<JsonResponse<BlogListResponse>, ApiError> {
    let blogs = db.list_blogs().await?;
    Ok(JsonResponse(BlogListResponse {
        success: true,
        count: blogs.len(),
        blogs,
    }))
}

pub async fn get_blog(
    Path(id): Path<String>,
    Extension(db): Extension<Arc<Database>>,
) -> Result<JsonResponse<BlogResponse>, ApiError> {
    let id = parse_blog_id(&id)?;
    let blog = load_blog(&db, &id).await?;
    Ok(JsonResponse(BlogResponse {
        success: true,
        blog,
    }))
}

pub async fn create_blog(
    user: AuthUser,
    Extension(db): Extension<Arc<Database>>,
    Extension(settings): Extension<Arc<ServerSettings>>,
    payload: FormPayload,
) -> Result<(StatusCode, JsonResponse<BlogResponse>), ApiError> {
    let result = insert_blog(&user, &db, &settings, &payload).await;
    payload.discard_files().await;
    let blog = result?;
    info!(blog_id = %blog.id, author_id = %user.id, "blog created");
    Ok((
        StatusCode::CREATED,
        JsonResponse(BlogResponse {
            success: true,
            blog,
        }),
    ))
}

async fn insert_blog(
    user: &AuthUser,
    db: &Database,
    settings: &ServerSettings,
    payload: &FormPayload,
) -> Result<BlogRecord, ApiError> {
    let mut messages = Vec::new();
    match payload.field("title") {
        None => messages.push("Title is required".to_string()),
        Some(title) => messages.extend(title_error(title)),
    }
    if payload.field("content").is_none() {
        messages.push("Content is required".to_string());
    }
    messages.extend(cover_error(payload));
    if !messages.is_empty() {
        return Err(ApiError::Validation(messages));
    }

    let cover_image = match payload.file(COVER_FIELD) {
        Some(file) => Some(store_file(settings, file).await?.url),
        None => None,
    };
    let inserted = db
        .insert_blog(NewBlog {
            title: payload.field("title").unwrap_or_default().to_string(),
            content: payload.field("content").unwrap_or_default().to_string(),
            cover_image: cover_image.clone(),
            author_id: user.id.clone(),
        })
        .await;
    match inserted {
        Ok(blog) => Ok(blog),
        Err(err) => {
            if let Some(url) = &cover_image {
                remove_stored(settings, url).await;
            }
            Err(err.into())
        }
    }
}

/// 仅作者可修改；新封面替换并删除旧文件。
pub async fn update_blog(
    user: AuthUser,
    Path(id): Path<String>,
    Extension(db): Extension<Arc<Database>>,
    Extension(settings): Extension<Arc<ServerSettings>>,
    payload: FormPayload,
) -> Result<JsonResponse<BlogResponse>, ApiError> {
    let result = apply_blog_update(&user, &id, &db, &settings, &payload).await;
    payload.discard_files().await;
    let blog = result?;
    info!(blog_id = %blog.id, "blog updated");
    Ok(JsonResponse(BlogResponse {
        success: true,
        blog,
    }))
}

async fn apply_blog_update(
    user: &AuthUser,
    raw_id: &str,
    db: &Database,
    settings: &ServerSettings,
    payload: &FormPayload,
) -> Result<BlogRecord, ApiError> {
    let id = parse_blog_id(raw_id)?;
    let existing = load_owned_blog(db, &id, user).await?;

    let mut messages = Vec::new();
    if payload.fields.contains_key("title") {
        match payload.field("title") {
            None => messages.push("Title cannot be empty".to_string()),
            Some(title) => messages.extend(title_error(title)),
        }
    }
    if payload.fields.contains_key("content") && payload.field("content").is_none() {
        messages.push("Content cannot be empty".to_string());
    }
    messages.extend(cover_error(payload));
    if !messages.is_empty() {
        return Err(ApiError::Validation(messages));
    }

    let cover_image = match payload.file(COVER_FIELD) {
        Some(file) => Some(store_file(settings, file).await?.url),
        None => None,
    };
    let changes = BlogChanges {
        title: payload.field("title").map(str::to_string),
        content: payload.field("content").map(str::to_string),
        cover_image: cover_image.clone(),
    };
    match db.update_blog(&id, changes).await {
        Ok(blog) => {
            if cover_image.is_some()
                && let Some(old) = existing.cover_image.as_deref()
            {
                remove_stored(settings, old).await;
            }
            Ok(blog)
        }
        Err(err) => {
            if let Some(url) = &cover_image {
                remove_stored(settings, url).await;
            }
            Err(err.into())
        }
    }
}

pub async fn delete_blog(
    user: AuthUser,
    Path(id): Path<String>,
    Extension(db): Extension<Arc<Database>>,
    Extension(settings): Extension<Arc<ServerSettings>>,
) -> Result<StatusCode, ApiError> {
    let id = parse_blog_id(&id)?;
    let blog = load_owned_blog(&db, &id, &user).await?;
    if !db.delete_blog(&id).await? {
        return Err(ApiError::NotFound("Blog not found".into()));
    }
    if let Some(cover) = blog.cover_image.as_deref() {
        remove_stored(&settings, cover).await;
    }
    info!(blog_id = %id, "blog deleted");
    Ok(StatusCode::NO_CONTENT)
}
