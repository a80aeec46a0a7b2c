use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use otpgate_auth_types::identity::IdentityHeaders;

use crate::domain::types::Channel;
use crate::error::OtpServiceError;
use crate::state::AppState;

// ── POST /otp/generate ────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOtpRequest {
    /// Defaults to the caller. Only admins may target another user.
    pub user_id: Option<Uuid>,
    pub operation_id: String,
    pub channel: String,
}

pub async fn generate_otp(
    State(state): State<AppState>,
    identity: IdentityHeaders,
    Json(body): Json<GenerateOtpRequest>,
) -> Result<StatusCode, OtpServiceError> {
    let channel: Channel = body.channel.parse()?;
    let user_id = body.user_id.unwrap_or(identity.user_id);
    if user_id != identity.user_id && !identity.is_admin() {
        return Err(OtpServiceError::Forbidden);
    }

    state
        .engine()
        .generate_and_send(user_id, &body.operation_id, channel)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

// ── POST /otp/validate ────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ValidateOtpRequest {
    pub code: String,
}

#[derive(Serialize)]
pub struct ValidateOtpResponse {
    pub valid: bool,
}

pub async fn validate_otp(
    State(state): State<AppState>,
    _identity: IdentityHeaders,
    Json(body): Json<ValidateOtpRequest>,
) -> Result<Json<ValidateOtpResponse>, OtpServiceError> {
    if !state.engine().validate(&body.code).await? {
        return Err(OtpServiceError::InvalidOtp);
    }
    Ok(Json(ValidateOtpResponse { valid: true }))
}
