//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server-class errors to
//! Sentry before responding to the client. All route handlers return
//! `Result<T, AppError>`. Responses carry a machine-readable `code` so
//! clients can distinguish "fix your form" from "adjust your selection"
//! from "just retry".

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::cart::CartError;
use crate::checkout::CheckoutError;
use crate::db::RepositoryError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Order commit failed or was rejected.
    #[error("checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Cart storage failed.
    #[error("cart error: {0}")]
    Cart(#[from] CartError),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] RepositoryError),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller is not signed in.
    #[error("unauthorized")]
    Unauthorized,

    /// Bad request from client.
    #[error("bad request: {0}")]
    BadRequest(String),
}

/// JSON error body: `{"code": "...", "message": "..."}`.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl AppError {
    /// Whether this error is a server fault worth capturing.
    fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Cart(_) | Self::Checkout(CheckoutError::CommitFailed(_))
        )
    }

    /// Machine-readable error code for the response body.
    const fn code(&self) -> &'static str {
        match self {
            Self::Checkout(err) => match err {
                CheckoutError::Validation(_) => "validation_failed",
                CheckoutError::UnknownSku(_) => "not_found",
                CheckoutError::Stock(_) => "out_of_stock",
                CheckoutError::Conflict(_) => "conflict_retry",
                CheckoutError::CommitFailed(_) => "commit_failed",
            },
            Self::Cart(_) | Self::Database(_) => "internal_error",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::BadRequest(_) => "validation_failed",
        }
    }

    const fn status(&self) -> StatusCode {
        match self {
            Self::Checkout(err) => match err {
                CheckoutError::Validation(_) => StatusCode::BAD_REQUEST,
                CheckoutError::UnknownSku(_) => StatusCode::NOT_FOUND,
                CheckoutError::Stock(_) | CheckoutError::Conflict(_) => StatusCode::CONFLICT,
                CheckoutError::CommitFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Cart(_) | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Client-facing message. Internal details are never exposed.
    fn message(&self) -> String {
        match self {
            Self::Checkout(err) => match err {
                CheckoutError::CommitFailed(_) => "order commit failed".to_owned(),
                other => other.to_string(),
            },
            Self::Cart(_) | Self::Database(_) => "internal server error".to_owned(),
            Self::NotFound(what) => format!("not found: {what}"),
            Self::Unauthorized => "sign in required".to_owned(),
            Self::BadRequest(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let body = ErrorBody {
            code: self.code(),
            message: self.message(),
        };

        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use clementine_core::SkuId;

    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("sku 123".to_string());
        assert_eq!(err.to_string(), "not found: sku 123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "bad request: invalid input");
    }

    #[test]
    fn test_checkout_error_codes() {
        let err = AppError::Checkout(CheckoutError::Stock(SkuId::new(5)));
        assert_eq!(err.code(), "out_of_stock");
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err = AppError::Checkout(CheckoutError::Conflict(SkuId::new(5)));
        assert_eq!(err.code(), "conflict_retry");
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err = AppError::Checkout(CheckoutError::Validation("bad address".to_owned()));
        assert_eq!(err.code(), "validation_failed");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_commit_failure_is_opaque() {
        let err = AppError::Checkout(CheckoutError::CommitFailed(
            crate::db::RepositoryError::Conflict("order id already exists".to_owned()),
        ));
        assert_eq!(err.code(), "commit_failed");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // The duplicate-key detail stays server-side.
        assert_eq!(err.message(), "order commit failed");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::NotFound("test".to_string()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::BadRequest("test".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
