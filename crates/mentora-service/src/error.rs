//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Insufficient credits for the requested operation.
    ///
    /// Serializes to the payload the client billing UI consumes directly.
    #[error("insufficient credits: required={required}, available={available}")]
    InsufficientCredits {
        /// Estimated cost of the operation.
        required: f64,
        /// Available balance at check time.
        available: f64,
        /// Exactly `required - available`.
        shortfall: f64,
        /// Total token estimate used for the check.
        estimated_tokens: u64,
    },

    /// The wrapped AI operation failed upstream.
    #[error("upstream operation failed: {0}")]
    Upstream(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body for non-billing errors.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // The insufficient-credits payload is a client contract, shaped
            // differently from the generic error envelope.
            Self::InsufficientCredits {
                required,
                available,
                shortfall,
                estimated_tokens,
            } => {
                let body = json!({
                    "message": self.to_string(),
                    "error": "INSUFFICIENT_CREDITS",
                    "data": {
                        "required": required,
                        "available": available,
                        "shortfall": shortfall,
                        "estimatedTokens": estimated_tokens,
                    },
                });
                return (StatusCode::PAYMENT_REQUIRED, Json(body)).into_response();
            }
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            Self::Upstream(msg) => (StatusCode::BAD_GATEWAY, "upstream_error", msg.clone()),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<mentora_store::StoreError> for ApiError {
    fn from(err: mentora_store::StoreError) -> Self {
        match err {
            mentora_store::StoreError::NotFound => Self::NotFound("record not found".into()),
            mentora_store::StoreError::InvalidMutation(msg) => Self::BadRequest(msg),
            mentora_store::StoreError::InsufficientCredits {
                available,
                required,
            } => Self::InsufficientCredits {
                required,
                available,
                shortfall: required - available,
                estimated_tokens: 0,
            },
            mentora_store::StoreError::DuplicateSettlement { .. } => {
                Self::BadRequest(err.to_string())
            }
            mentora_store::StoreError::Database(msg)
            | mentora_store::StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

impl From<mentora_pipeline::AuthError> for ApiError {
    fn from(err: mentora_pipeline::AuthError) -> Self {
        match err {
            mentora_pipeline::AuthError::InsufficientCredits {
                required,
                available,
                shortfall,
                estimated_tokens,
            } => Self::InsufficientCredits {
                required,
                available,
                shortfall,
                estimated_tokens,
            },
            mentora_pipeline::AuthError::Store(store_err) => store_err.into(),
        }
    }
}
