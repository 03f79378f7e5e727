//! 统一的 API 错误类型与 JSON 错误体映射。

use axum::Json;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::debug;

use crate::storage::StorageError;

#[derive(Debug)]
pub enum ApiError {
    MissingToken,
    InvalidToken,
    FormParse(String),
    MissingFileField,
    FileNotFound,
    DeleteFailed(String),
    ReadFailed(String),
    RangeNotSatisfiable(u64),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    description: &'static str,
}

impl ApiError {
    /// 线上错误类型标识。
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::MissingToken => "no-token",
            ApiError::InvalidToken => "invalid-token",
            ApiError::FormParse(_) | ApiError::MissingFileField => "form-error",
            ApiError::FileNotFound => "file-not-found",
            ApiError::DeleteFailed(_) => "delete-error",
            ApiError::ReadFailed(_) => "read-error",
            ApiError::RangeNotSatisfiable(_) => "range-not-satisfiable",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingToken => StatusCode::BAD_REQUEST,
            // 表单错误沿用 401，客户端依赖该状态码。
            ApiError::InvalidToken | ApiError::FormParse(_) | ApiError::MissingFileField => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::FileNotFound => StatusCode::NOT_FOUND,
            ApiError::DeleteFailed(_) | ApiError::ReadFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::RangeNotSatisfiable(_) => StatusCode::RANGE_NOT_SATISFIABLE,
        }
    }

    fn detail(&self) -> Option<&str> {
        match self {
            ApiError::FormParse(detail)
            | ApiError::DeleteFailed(detail)
            | ApiError::ReadFailed(detail) => Some(detail),
            _ => None,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            ApiError::MissingToken => "The token is required",
            ApiError::InvalidToken => "The token is invalid",
            ApiError::FormParse(_) => "There was an error processing the form",
            ApiError::MissingFileField => "File must be in the file key",
            ApiError::FileNotFound => "The file was not found",
            ApiError::DeleteFailed(_) => "Error deleting file",
            ApiError::ReadFailed(_) => "Error reading file",
            ApiError::RangeNotSatisfiable(_) => "The requested range is not satisfiable",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        if let ApiError::RangeNotSatisfiable(size) = &self
            && let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}"))
        {
            headers.insert(header::CONTENT_RANGE, value);
        }
        if let Some(detail) = self.detail() {
            debug!(kind = self.kind(), detail, "request failed");
        }
        let body = ErrorBody {
            error: self.kind(),
            description: self.description(),
        };
        (self.status(), headers, Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidPath => ApiError::FileNotFound,
            StorageError::Io(err) => match err.kind() {
                std::io::ErrorKind::NotFound => ApiError::FileNotFound,
                _ => ApiError::ReadFailed(err.to_string()),
            },
        }
    }
}
