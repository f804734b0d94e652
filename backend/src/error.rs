//! Error type returned by every HTTP handler.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use edufin_common::ErrorBody;

use crate::auth::TokenError;
use crate::billing::{StripeError, WebhookError};
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Email already registered")]
    DuplicateEmail,

    /// Same message for unknown email and wrong password.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Missing priceId")]
    MissingPriceId,

    #[error("Unknown priceId: {0}")]
    UnknownPriceId(String),

    #[error("Too many sign-in attempts, try again later")]
    TooManyAttempts,

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Payment provider unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::DuplicateEmail => StatusCode::CONFLICT,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::MissingPriceId => StatusCode::BAD_REQUEST,
            ApiError::UnknownPriceId(_) => StatusCode::BAD_REQUEST,
            ApiError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InvalidSignature(_) => StatusCode::BAD_REQUEST,
            ApiError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::DuplicateEmail => "duplicate_email",
            ApiError::InvalidCredentials => "invalid_credentials",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::MissingPriceId => "missing_price_id",
            ApiError::UnknownPriceId(_) => "unknown_price_id",
            ApiError::TooManyAttempts => "too_many_attempts",
            ApiError::InvalidSignature(_) => "invalid_signature",
            ApiError::UpstreamUnavailable(_) => "upstream_unavailable",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "{}", self);
        }

        // Internal details stay in the log.
        let error = match &self {
            ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let body = Json(ErrorBody {
            error,
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => ApiError::DuplicateEmail,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Signing(msg) => ApiError::Internal(msg),
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

impl From<StripeError> for ApiError {
    fn from(e: StripeError) -> Self {
        ApiError::UpstreamUnavailable(e.to_string())
    }
}

impl From<WebhookError> for ApiError {
    fn from(e: WebhookError) -> Self {
        match e {
            WebhookError::InvalidPayload(msg) => ApiError::Validation(msg),
            other => ApiError::InvalidSignature(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::DuplicateEmail.status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::MissingPriceId.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::TooManyAttempts.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ApiError::UpstreamUnavailable("timeout".to_string()).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_invalid_credentials_message_is_generic() {
        let msg = ApiError::InvalidCredentials.to_string();
        assert!(!msg.to_lowercase().contains("not found"));
        assert!(!msg.to_lowercase().contains("wrong password"));
    }

    #[test]
    fn test_store_duplicate_maps_to_duplicate_email() {
        let err: ApiError = StoreError::DuplicateEmail.into();
        assert!(matches!(err, ApiError::DuplicateEmail));
    }

    #[test]
    fn test_stripe_error_maps_to_upstream() {
        let err: ApiError = StripeError::Timeout.into();
        assert!(matches!(err, ApiError::UpstreamUnavailable(_)));
    }

    #[test]
    fn test_token_error_maps_to_unauthorized() {
        let err: ApiError = TokenError::Revoked.into();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
