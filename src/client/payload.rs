//! 请求体：JSON 对象或带文件的 multipart 表单。

use reqwest::RequestBuilder;
use reqwest::multipart::{Form, Part};
use serde_json::{Map, Value};

use super::failure::{AuthFailure, FailureKind};

#[derive(Clone, Debug, PartialEq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Json(Map<String, Value>),
    Multipart {
        fields: Vec<(String, String)>,
        files: Vec<FilePart>,
    },
}

impl Payload {
    /// 由字符串键值对构造 JSON 请求体。
    pub fn json<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Payload::Json(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    /// 写入请求；multipart 的 `Content-Type` 与分隔符由 reqwest 生成。
    pub(crate) fn attach(self, request: RequestBuilder) -> Result<RequestBuilder, AuthFailure> {
        match self {
            Payload::Json(map) => Ok(request.json(&map)),
            Payload::Multipart { fields, files } => {
                let mut form = Form::new();
                for (name, value) in fields {
                    form = form.text(name, value);
                }
                for file in files {
                    let part = Part::bytes(file.bytes)
                        .file_name(file.file_name)
                        .mime_str(&file.mime_type)
                        .map_err(|err| {
                            AuthFailure::new(
                                FailureKind::Validation,
                                format!("Invalid file type: {err}"),
                            )
                        })?;
                    form = form.part(file.field, part);
                }
                Ok(request.multipart(form))
            }
        }
    }
}
