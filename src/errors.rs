use axum::{http::StatusCode, Json};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("origin denied")]
    OriginDenied,
    #[error("request too large")]
    RequestTooLarge,
    #[error("rate limited")]
    RateLimited,
    #[error("not found")]
    NotFound,
    #[error("invalid arguments: {0}")]
    SchemaInvalid(String),
    #[error("Access denied - path outside allowed directories: {0}")]
    AccessDenied(String),
    #[error("Parent directory does not exist: {}", .0.display())]
    ParentNotFound(PathBuf),
    #[error("Could not find a text range between the given beforeText and afterText")]
    RangeNotFound,
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized => "Unauthorized",
            AppError::OriginDenied => "OriginDenied",
            AppError::RequestTooLarge => "RequestTooLarge",
            AppError::RateLimited => "RateLimited",
            AppError::NotFound => "NotFound",
            AppError::SchemaInvalid(_) => "SchemaInvalid",
            AppError::AccessDenied(_) => "AccessDenied",
            AppError::ParentNotFound(_) => "ParentNotFound",
            AppError::RangeNotFound => "RangeNotFound",
            AppError::InvalidPattern(_) => "InvalidPattern",
            AppError::Io(_) => "IOFailure",
            AppError::Internal(_) => "Internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::OriginDenied | AppError::AccessDenied(_) => StatusCode::FORBIDDEN,
            AppError::RequestTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::NotFound | AppError::ParentNotFound(_) | AppError::RangeNotFound => StatusCode::NOT_FOUND,
            AppError::SchemaInvalid(_) | AppError::InvalidPattern(_) => StatusCode::BAD_REQUEST,
            AppError::Io(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Errors raised by a tool body rather than by the HTTP surface around it.
    /// These become error-flagged results instead of HTTP failures.
    pub fn is_tool_level(&self) -> bool {
        !matches!(
            self,
            AppError::Unauthorized
                | AppError::OriginDenied
                | AppError::RequestTooLarge
                | AppError::RateLimited
                | AppError::NotFound
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;

pub fn into_response(err: AppError) -> (StatusCode, Json<ErrorBody>) {
    let code = err.code();
    let message = err.to_string();
    (err.status(), Json(ErrorBody { code, message }))
}
