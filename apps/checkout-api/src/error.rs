//! HTTP error mapping.
//!
//! Every error body is `{ "code": ..., "message": ... }`. Server-side
//! failures are logged here and reach the client as a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use checkout_core::CoreError;
use checkout_engine::{EngineError, ProviderError};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing or empty {0} header")]
    MissingSession(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::MissingSession(_) => (StatusCode::UNAUTHORIZED, "unauthenticated", self.to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            ApiError::Engine(err) => match err {
                EngineError::Rejected(msg) => (StatusCode::BAD_REQUEST, "rejected", msg.clone()),
                EngineError::Core(CoreError::InvariantViolation(_)) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                ),
                EngineError::Core(e) => (StatusCode::BAD_REQUEST, "rejected", e.to_string()),
                EngineError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found", err.to_string()),
                EngineError::Database(e) if e.is_not_found() => {
                    (StatusCode::NOT_FOUND, "not_found", e.to_string())
                }
                EngineError::InvalidState(msg) => (StatusCode::CONFLICT, "invalid_state", msg.clone()),
                EngineError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
                EngineError::Provider(ProviderError::InvalidSignature) => {
                    (StatusCode::UNAUTHORIZED, "invalid_signature", err.to_string())
                }
                EngineError::Provider(ProviderError::NotConfigured(p)) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "provider_unavailable",
                    format!("{} is not available", p),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                ),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (status, Json(ErrorBody { code, message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout_core::{CouponRejection, PaymentProvider};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::MissingSession("x-user-id"), StatusCode::UNAUTHORIZED),
            (ApiError::from(EngineError::from(CouponRejection::Expired {
                expires_on: chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            })), StatusCode::BAD_REQUEST),
            (ApiError::from(EngineError::not_found("Order", "o-1")), StatusCode::NOT_FOUND),
            (ApiError::from(EngineError::InvalidState("paid".into())), StatusCode::CONFLICT),
            (
                ApiError::from(EngineError::from(ProviderError::NotConfigured(PaymentProvider::Paypal))),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (ApiError::from(EngineError::InvalidConfig("x".into())), StatusCode::INTERNAL_SERVER_ERROR),
            (
                ApiError::from(EngineError::Core(CoreError::InvariantViolation("discount".into()))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::from(EngineError::Core(CoreError::EmptyCart)), StatusCode::BAD_REQUEST),
        ];

        for (err, expected) in cases {
            assert_eq!(err.parts().0, expected, "{:?}", err);
        }
    }

    #[test]
    fn test_internal_details_hidden() {
        let err = ApiError::from(EngineError::InvalidConfig("secret path".into()));
        assert_eq!(err.parts().2, "Internal server error");
    }
}
