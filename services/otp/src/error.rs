use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::domain::types::Channel;
use crate::notify::DeliveryError;

/// OTP service domain error variants.
#[derive(Debug, thiserror::Error)]
pub enum OtpServiceError {
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
    #[error("otp policy is not initialized")]
    PolicyNotInitialized,
    #[error("user not found")]
    UserNotFound,
    #[error("user has no address for channel {0}")]
    UnsupportedChannel(Channel),
    #[error("invalid channel")]
    InvalidChannel,
    #[error("invalid or expired code")]
    InvalidOtp,
    #[error("forbidden")]
    Forbidden,
    #[error("no free code available, try again")]
    CodeCollision,
    #[error("delivery failed: {0}")]
    DeliveryFailed(#[from] DeliveryError),
    #[error("persistence error")]
    Persistence(#[from] anyhow::Error),
}

impl OtpServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPolicy(_) => "INVALID_POLICY",
            Self::PolicyNotInitialized => "POLICY_NOT_INITIALIZED",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::UnsupportedChannel(_) => "UNSUPPORTED_CHANNEL",
            Self::InvalidChannel => "INVALID_CHANNEL",
            Self::InvalidOtp => "INVALID_OTP",
            Self::Forbidden => "FORBIDDEN",
            Self::CodeCollision => "CODE_COLLISION",
            Self::DeliveryFailed(_) => "DELIVERY_FAILED",
            Self::Persistence(_) => "PERSISTENCE",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidPolicy(_)
            | Self::UnsupportedChannel(_)
            | Self::InvalidChannel
            | Self::InvalidOtp => StatusCode::BAD_REQUEST,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::PolicyNotInitialized | Self::CodeCollision => StatusCode::SERVICE_UNAVAILABLE,
            Self::DeliveryFailed(_) => StatusCode::BAD_GATEWAY,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for OtpServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        // 4xx are expected client errors and already visible in the TraceLayer span.
        match &self {
            Self::Persistence(e) => {
                tracing::error!(error = ?e, kind = self.kind(), "persistence error");
            }
            Self::DeliveryFailed(e) => {
                tracing::error!(error = %e, kind = self.kind(), "delivery failed");
            }
            Self::PolicyNotInitialized => {
                tracing::error!(kind = self.kind(), "otp policy row is missing");
            }
            Self::CodeCollision => {
                tracing::error!(kind = self.kind(), "active code space exhausted");
            }
            _ => {}
        }
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
