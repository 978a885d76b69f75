//! Error taxonomy. The ingress layer is the only place that maps an
//! `AppError` to an HTTP status; every other component returns
//! `Result<_, AppError>` (or a narrower local error) and never panics
//! past its boundary.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("dispatch failed: {0}")]
    DispatchFailed(String),

    #[error("degraded: {0}")]
    Degraded(String),

    #[error("ingress queue is full, try again shortly")]
    Backpressure,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InsufficientData(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DispatchFailed(_) => StatusCode::OK,
            AppError::Degraded(_) => StatusCode::OK,
            AppError::Backpressure => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.to_string(),
            "retryable": matches!(
                self,
                AppError::Timeout(_) | AppError::StoreUnavailable(_) | AppError::Backpressure
            ),
        }))
    }
}

pub type AppResult<T> = Result<T, AppError>;
