//! 统一的 API 错误类型、错误信封与转换。

use axum::body::Body as AxumBody;
use axum::http::{HeaderValue, Request, StatusCode, header};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use axum::middleware;
use serde::Serialize;
use tracing::{debug, error};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation Error")]
    Validation(Vec<String>),
    #[error("Invalid ID format")]
    InvalidId,
    #[error("{0} already exists")]
    Duplicate(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Not allowed by CORS")]
    CorsRejected,
    #[error("{0}")]
    NotFound(String),
    #[error("API endpoint not found")]
    RouteNotFound { path: String, api: bool },
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("Too many requests")]
    TooManyRequests(u64),
    #[error("{message}")]
    Internal {
        message: String,
        detail: Option<String>,
    },
}

/// 所有错误响应共用的 JSON 信封。
#[derive(Clone, Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorEnvelope {
    fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            details: None,
            path: None,
            stack: None,
        }
    }
}

/// 仅在非生产环境渲染的内部错误细节，由 [`expose_error_details`] 读取。
#[derive(Clone, Debug)]
pub struct InternalDetail(pub String);

impl ApiError {
    /// 以固定消息包装内部错误，原始错误仅作为细节保留。
    pub fn internal(err: impl std::fmt::Display) -> Self {
        ApiError::Internal {
            message: "Internal server error".into(),
            detail: Some(err.to_string()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::InvalidId
            | ApiError::Duplicate(_)
            | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) | ApiError::CorsRejected => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) | ApiError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        match self {
            ApiError::Validation(messages) => ErrorEnvelope {
                details: Some(messages.clone()),
                ..ErrorEnvelope::new(self.to_string())
            },
            ApiError::RouteNotFound { path, api } => ErrorEnvelope {
                path: Some(path.clone()),
                ..ErrorEnvelope::new(if *api {
                    "API endpoint not found"
                } else {
                    "Not found"
                })
            },
            _ => ErrorEnvelope::new(self.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = ?self, "request failed");
        } else {
            debug!(status = status.as_u16(), error = %self, "request rejected");
        }

        let mut response = (status, JsonResponse(self.envelope())).into_response();
        match self {
            ApiError::TooManyRequests(retry_after) => {
                if retry_after > 0
                    && let Ok(value) = HeaderValue::from_str(&retry_after.to_string())
                {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
            }
            ApiError::Internal {
                detail: Some(detail),
                ..
            } => {
                response.extensions_mut().insert(InternalDetail(detail));
            }
            _ => {}
        }
        response
    }
}

/// 非生产环境下把内部错误细节写回响应体的 `stack` 字段。
pub async fn expose_error_details(
    request: Request<AxumBody>,
    next: middleware::Next,
) -> Response {
    let response = next.run(request).await;
    let Some(InternalDetail(detail)) = response.extensions().get::<InternalDetail>().cloned()
    else {
        return response;
    };
    let envelope = ErrorEnvelope {
        stack: Some(detail),
        ..ErrorEnvelope::new("Internal server error")
    };
    (response.status(), JsonResponse(envelope)).into_response()
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("resource not found".into()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ApiError::Duplicate(unique_violation_field(db.message()))
            }
            other => ApiError::internal(other),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::internal(err)
    }
}

/// 从 `UNIQUE constraint failed: users.email` 中提取列名。
fn unique_violation_field(message: &str) -> String {
    message
        .rsplit(':')
        .next()
        .and_then(|columns| columns.split(',').next())
        .map(str::trim)
        .map(|column| column.rsplit('.').next().unwrap_or(column))
        .filter(|column| !column.is_empty())
        .unwrap_or("field")
        .to_string()
}
