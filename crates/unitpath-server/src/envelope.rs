//! Response envelope and error mapping.
//!
//! Every response body is `{success, data}` or `{success: false, message}`.
//! HTTP 200 carries both business success and business failure; 404 is
//! reserved for unknown resources and 500 for faults of this service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use unitpath_core::error::EngineError;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Set on failures the caller may retry unchanged.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            retryable: false,
        }
    }
}

impl ApiResponse<()> {
    pub fn failure(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            retryable,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Errors a handler can return.
#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    /// Missing identity headers or an unreadable body or query. A business
    /// failure like any other, so it travels as a 200 failure envelope.
    Rejected(String),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Engine(EngineError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Engine(e) if e.is_fault() => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Engine(_) | ApiError::Rejected(_) => StatusCode::OK,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Engine(e) => {
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!("request failed: {e}");
                } else {
                    tracing::debug!("request rejected: {e}");
                }
                ApiResponse::failure(e.to_string(), e.is_retryable())
            }
            ApiError::Rejected(msg) => {
                tracing::debug!("request rejected: {msg}");
                ApiResponse::failure(msg.clone(), false)
            }
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;
