//! 服务端错误体的归一化。

use reqwest::StatusCode;
use serde_json::Value;

/// 每个远程操作的结果；失败从不以 panic 或传输错误的形式抛给调用方。
pub type AuthResult = Result<(), AuthFailure>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// 服务端给出的字段级错误。
    Validation,
    /// 其他非 2xx 响应。
    Rejected,
    /// 401，或本地没有令牌。
    Unauthorized,
    /// 请求未完成或响应无法解析。
    Network,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{}", .messages.join(", "))]
pub struct AuthFailure {
    pub kind: FailureKind,
    pub messages: Vec<String>,
}

impl AuthFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            messages: vec![message.into()],
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Network, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unauthorized, message)
    }

    /// 会话 `error` 中保存的单条消息。
    pub fn message(&self) -> String {
        self.messages.join(", ")
    }

    /// 依次尝试 `errors[].msg|error`、`details[]`、`error`，都没有则用 `fallback`。
    pub fn from_response(status: StatusCode, body: Option<&Value>, fallback: &str) -> Self {
        let field_errors = body.map(field_messages).unwrap_or_default();
        if !field_errors.is_empty() {
            return Self {
                kind: kind_for(status, FailureKind::Validation),
                messages: field_errors,
            };
        }
        Self::from_error_field(status, body, fallback)
    }

    /// 只读取顶层 `error` 字段。
    pub fn from_error_field(status: StatusCode, body: Option<&Value>, fallback: &str) -> Self {
        let message = body
            .and_then(|body| body.get("error"))
            .and_then(Value::as_str)
            .filter(|message| !message.is_empty())
            .unwrap_or(fallback);
        Self::new(kind_for(status, FailureKind::Rejected), message)
    }
}

fn kind_for(status: StatusCode, otherwise: FailureKind) -> FailureKind {
    if status == StatusCode::UNAUTHORIZED {
        FailureKind::Unauthorized
    } else {
        otherwise
    }
}

fn field_messages(body: &Value) -> Vec<String> {
    if let Some(errors) = body.get("errors").and_then(Value::as_array) {
        let messages: Vec<String> = errors
            .iter()
            .filter_map(|entry| match entry {
                Value::String(message) => Some(message.as_str()),
                entry => entry
                    .get("msg")
                    .and_then(Value::as_str)
                    .or_else(|| entry.get("error").and_then(Value::as_str)),
            })
            .map(str::to_string)
            .collect();
        if !messages.is_empty() {
            return messages;
        }
    }
    body.get("details")
        .and_then(Value::as_array)
        .map(|details| {
            details
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
