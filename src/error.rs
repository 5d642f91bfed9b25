// SPDX-License-Identifier: MIT

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// No token record exists; the account must re-run authorization.
    #[error("amoCRM tokens not found, authorization required")]
    AuthRequired,

    /// The refresh-token exchange failed. Fatal to the current request: the
    /// stale access token is never used as a fallback.
    #[error("amoCRM token refresh failed: {0}")]
    TokenRefresh(String),

    /// Non-2xx response from any amoCRM endpoint other than the token one.
    #[error("amoCRM API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Only GET and POST are supported by the request layer.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Transport-level failure talking to the CRM, folded into the API bucket
    /// with a synthetic status of 0.
    pub fn transport(err: reqwest::Error) -> Self {
        AppError::Api {
            status: 0,
            body: err.to_string(),
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::AuthRequired => (StatusCode::UNAUTHORIZED, "auth_required", None),
            AppError::TokenRefresh(msg) => {
                tracing::error!(error = %msg, "Token refresh failed");
                (StatusCode::UNAUTHORIZED, "token_refresh_failed", None)
            }
            AppError::Api { status, body } => {
                tracing::error!(status, body = %body, "amoCRM API error");
                (StatusCode::BAD_GATEWAY, "amocrm_error", Some(body.clone()))
            }
            AppError::UnsupportedMethod(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "unsupported_method",
                Some(m.clone()),
            ),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
