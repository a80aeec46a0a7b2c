use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use otpgate_auth_types::identity::IdentityHeaders;
use otpgate_core::serde::to_rfc3339_ms;

use crate::error::OtpServiceError;
use crate::state::AppState;
use crate::usecase::admin::{DeleteUserUseCase, ListUsersUseCase};
use crate::usecase::policy::{GetPolicyUseCase, UpdatePolicyUseCase};

fn require_admin(identity: &IdentityHeaders) -> Result<(), OtpServiceError> {
    if identity.is_admin() {
        Ok(())
    } else {
        Err(OtpServiceError::Forbidden)
    }
}

// ── GET/PATCH /admin/config ───────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyBody {
    pub length: i32,
    pub ttl_seconds: i32,
}

pub async fn get_config(
    State(state): State<AppState>,
    identity: IdentityHeaders,
) -> Result<Json<PolicyBody>, OtpServiceError> {
    require_admin(&identity)?;
    let usecase = GetPolicyUseCase {
        policy: state.policy_store(),
    };
    let policy = usecase.execute().await?;
    Ok(Json(PolicyBody {
        length: policy.length(),
        ttl_seconds: policy.ttl_seconds(),
    }))
}

pub async fn update_config(
    State(state): State<AppState>,
    identity: IdentityHeaders,
    Json(body): Json<PolicyBody>,
) -> Result<StatusCode, OtpServiceError> {
    require_admin(&identity)?;
    let usecase = UpdatePolicyUseCase {
        policy: state.policy_store(),
    };
    usecase.execute(body.length, body.ttl_seconds).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── GET /admin/users ──────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub role: u8,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub telegram_chat_id: Option<String>,
    #[serde(serialize_with = "to_rfc3339_ms")]
    pub created_at: DateTime<Utc>,
}

pub async fn list_users(
    State(state): State<AppState>,
    identity: IdentityHeaders,
) -> Result<Json<Vec<UserResponse>>, OtpServiceError> {
    require_admin(&identity)?;
    let usecase = ListUsersUseCase {
        users: state.user_directory(),
    };
    let users = usecase.execute().await?;
    let body = users
        .into_iter()
        .map(|user| UserResponse {
            id: user.id,
            username: user.username,
            role: user.role,
            email: user.email,
            phone: user.phone,
            telegram_chat_id: user.telegram_chat_id,
            created_at: user.created_at,
        })
        .collect();
    Ok(Json(body))
}

// ── DELETE /admin/users/{id} ──────────────────────────────────────────────────

pub async fn delete_user(
    State(state): State<AppState>,
    identity: IdentityHeaders,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, OtpServiceError> {
    require_admin(&identity)?;
    let usecase = DeleteUserUseCase {
        users: state.user_directory(),
    };
    usecase.execute(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
