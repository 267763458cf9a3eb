//! 用户注册、登录与个人资料接口。

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::Json as JsonResponse;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::app::ServerSettings;
use crate::auth::{AuthUser, TokenKeys, hash_password, verify_password};
use crate::db::{Database, NewUser, PublicUser, UserChanges};
use crate::error::ApiError;
use crate::media::{check_image, remove_stored, store_file};
use crate::upload::FormPayload;

const MIN_PASSWORD_LEN: usize = 6;
const MAX_NAME_LEN: usize = 100;
const INVALID_CREDENTIALS: &str = "Invalid Credentials";

#[derive(Serialize)]
pub struct SignupResponse {
    success: bool,
    message: &'static str,
}

#[derive(Serialize)]
pub struct LoginResponse {
    token: String,
    user: PublicUser,
}

#[derive(Serialize)]
pub struct ProfileResponse {
    success: bool,
    user: PublicUser,
}

/// 宽松的邮箱格式检查：一个 `@`，且域名部分含 `.`。
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        && !email.chars().any(char::is_whitespace)
}

fn signup_errors(payload: &FormPayload) -> Vec<String> {
    let mut messages = Vec::new();
    match payload.field("name") {
        None => messages.push("Name is required".to_string()),
        Some(name) if name.chars().count() > MAX_NAME_LEN => {
            messages.push(format!("Name must be {MAX_NAME_LEN} characters or fewer"))
        }
        Some(_) => {}
    }
    if !payload.field("email").is_some_and(is_valid_email) {
        messages.push("Please include a valid email".to_string());
    }
    if payload
        .fields
        .get("password")
        .is_none_or(|password| password.chars().count() < MIN_PASSWORD_LEN)
    {
        messages.push(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        ));
    }
    if let Some(message) = payload
        .file("avatar")
        .and_then(|avatar| check_image(avatar, "Avatar"))
    {
        messages.push(message);
    }
    messages
}

/// 注册：接受 JSON、urlencoded 或带头像的 multipart。注册后不自动登录。
pub async fn signup(
    Extension(db): Extension<Arc<Database>>,
    Extension(settings): Extension<Arc<ServerSettings>>,
    payload: FormPayload,
) -> Result<(StatusCode, JsonResponse<SignupResponse>), ApiError> {
    let result = register(&db, &settings, &payload).await;
    payload.discard_files().await;
    let user_id = result?;
    info!(user_id, "user registered");
    Ok((
        StatusCode::CREATED,
        JsonResponse(SignupResponse {
            success: true,
            message: "User registered successfully",
        }),
    ))
}

async fn register(
    db: &Database,
    settings: &ServerSettings,
    payload: &FormPayload,
) -> Result<String, ApiError> {
    let messages = signup_errors(payload);
    if !messages.is_empty() {
        return Err(ApiError::Validation(messages));
    }

    let email = payload.field("email").unwrap_or_default().to_lowercase();
    if db.find_user_by_email(&email).await?.is_some() {
        return Err(ApiError::Duplicate("email".into()));
    }

    let password = payload.fields.get("password").cloned().unwrap_or_default();
    let password_hash = hash_password(password, settings.bcrypt_cost).await?;

    let avatar = match payload.file("avatar") {
        Some(file) => Some(store_file(settings, file).await?.url),
        None => None,
    };

    let inserted = db
        .insert_user(NewUser {
            name: payload.field("name").unwrap_or_default().to_string(),
            email,
            password_hash,
            bio: payload.field("bio").map(str::to_string),
            avatar: avatar.clone(),
        })
        .await;
    match inserted {
        Ok(user) => Ok(user.id),
        Err(err) => {
            if let Some(url) = &avatar {
                remove_stored(settings, url).await;
            }
            Err(err.into())
        }
    }
}

/// 登录：校验密码并签发 Bearer 令牌。
pub async fn login(
    Extension(db): Extension<Arc<Database>>,
    Extension(tokens): Extension<Arc<TokenKeys>>,
    payload: FormPayload,
) -> Result<JsonResponse<LoginResponse>, ApiError> {
    let result = authenticate(&db, &tokens, &payload).await;
    payload.discard_files().await;
    result.map(JsonResponse)
}

async fn authenticate(
    db: &Database,
    tokens: &TokenKeys,
    payload: &FormPayload,
) -> Result<LoginResponse, ApiError> {
    let mut messages = Vec::new();
    let email = payload.field("email");
    if email.is_none() {
        messages.push("Please include a valid email".to_string());
    }
    let password = payload.fields.get("password").filter(|p| !p.is_empty());
    if password.is_none() {
        messages.push("Password is required".to_string());
    }
    let (Some(email), Some(password)) = (email, password) else {
        return Err(ApiError::Validation(messages));
    };

    let Some(user) = db.find_user_by_email(&email.to_lowercase()).await? else {
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
    };
    if !verify_password(password.clone(), user.password_hash.clone()).await? {
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    let token = tokens.issue(&user.id)?;
    info!(user_id = %user.id, "user logged in");
    Ok(LoginResponse {
        token,
        user: user.into(),
    })
}

/// 当前用户资料；响应体即用户对象。
pub async fn get_profile(
    user: AuthUser,
    Extension(db): Extension<Arc<Database>>,
) -> Result<JsonResponse<PublicUser>, ApiError> {
    let record = db.find_user(&user.id).await.map_err(|err| match err {
        sqlx::Error::RowNotFound => ApiError::NotFound("User not found".into()),
        other => other.into(),
    })?;
    Ok(JsonResponse(record.into()))
}

/// 更新名称、简介或头像；新头像会替换并删除旧文件。
pub async fn update_profile(
    user: AuthUser,
    Extension(db): Extension<Arc<Database>>,
    Extension(settings): Extension<Arc<ServerSettings>>,
    payload: FormPayload,
) -> Result<JsonResponse<ProfileResponse>, ApiError> {
    let result = apply_profile_update(&user, &db, &settings, &payload).await;
    payload.discard_files().await;
    Ok(JsonResponse(ProfileResponse {
        success: true,
        user: result?,
    }))
}

async fn apply_profile_update(
    user: &AuthUser,
    db: &Database,
    settings: &ServerSettings,
    payload: &FormPayload,
) -> Result<PublicUser, ApiError> {
    let mut messages = Vec::new();
    if payload.fields.contains_key("name") {
        match payload.field("name") {
            None => messages.push("Name cannot be empty".to_string()),
            Some(name) if name.chars().count() > MAX_NAME_LEN => {
                messages.push(format!("Name must be {MAX_NAME_LEN} characters or fewer"))
            }
            Some(_) => {}
        }
    }
    if let Some(message) = payload
        .file("avatar")
        .and_then(|avatar| check_image(avatar, "Avatar"))
    {
        messages.push(message);
    }
    if !messages.is_empty() {
        return Err(ApiError::Validation(messages));
    }

    let previous = db.find_user(&user.id).await.map_err(|err| match err {
        sqlx::Error::RowNotFound => ApiError::NotFound("User not found".into()),
        other => other.into(),
    })?;

    let avatar = match payload.file("avatar") {
        Some(file) => Some(store_file(settings, file).await?.url),
        None => None,
    };
    let changes = UserChanges {
        name: payload.field("name").map(str::to_string),
        bio: payload.fields.get("bio").map(|bio| bio.trim().to_string()),
        avatar: avatar.clone(),
    };

    match db.update_user(&user.id, changes).await {
        Ok(updated) => {
            if avatar.is_some()
                && let Some(old) = previous.avatar.as_deref()
            {
                remove_stored(settings, old).await;
            }
            info!(user_id = %user.id, "profile updated");
            Ok(updated.into())
        }
        Err(err) => {
            if let Some(url) = &avatar {
                remove_stored(settings, url).await;
            }
            Err(err.into())
        }
    }
}
