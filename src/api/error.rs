//! HTTP 错误响应
//!
//! 所有错误统一返回 `{ "error": "..." }`

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::error::{AppError, SessionError, SettingsError, UploadError};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// 处理函数的错误类型
#[derive(Debug)]
pub enum ApiError {
    App(AppError),
    NotFound(String),
    BadRequest(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::App(err) => match err {
                AppError::Session(e) => match e {
                    SessionError::NotFound { .. } => StatusCode::NOT_FOUND,
                    SessionError::QueueFull { .. } | SessionError::WorkerPoolClosed => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                    SessionError::NoFiles
                    | SessionError::NotPending { .. }
                    | SessionError::NotCompleted { .. }
                    | SessionError::AlreadyFinished { .. } => StatusCode::BAD_REQUEST,
                },
                AppError::Upload(_) => StatusCode::BAD_REQUEST,
                AppError::Settings(SettingsError::InvalidPackagerMode { .. }) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::App(err) => match err {
                // 客户端只需要内层错误信息
                AppError::Session(e) => e.to_string(),
                AppError::Upload(e) => e.to_string(),
                AppError::Settings(e) => e.to_string(),
                other => other.to_string(),
            },
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            error!("请求处理失败 ({}): {}", status, message);
        }
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError::App(err)
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        ApiError::App(err.into())
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        ApiError::App(err.into())
    }
}

impl From<SettingsError> for ApiError {
    fn from(err: SettingsError) -> Self {
        ApiError::App(err.into())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::App(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let not_found: ApiError = SessionError::NotFound {
            session_id: "x".to_string(),
        }
        .into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let full: ApiError = SessionError::QueueFull { capacity: 1 }.into();
        assert_eq!(full.status(), StatusCode::SERVICE_UNAVAILABLE);

        let upload: ApiError = UploadError::NoFiles.into();
        assert_eq!(upload.status(), StatusCode::BAD_REQUEST);
        assert_eq!(upload.message(), "未提供文件");

        let io: ApiError = std::io::Error::other("disk").into();
        assert_eq!(io.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
