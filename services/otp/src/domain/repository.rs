//! Ports consumed by the OTP engine and the admin use cases.
//!
//! Methods return `Send` futures so the engine can be shared across request
//! tasks and driven from `tokio::spawn` by the sweeper. Implementations may
//! still be written with `async fn`.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::types::{Channel, OtpCode, OtpUser, Policy};
use crate::error::OtpServiceError;
use crate::notify::DeliveryError;

/// Read access to users owned by the registration service, plus admin deletion.
pub trait UserDirectory: Send + Sync {
    fn find_by_id(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<OtpUser>, OtpServiceError>> + Send;

    fn exists(&self, id: Uuid) -> impl Future<Output = Result<bool, OtpServiceError>> + Send;

    /// Every user whose role is below admin.
    fn list_without_admins(
        &self,
    ) -> impl Future<Output = Result<Vec<OtpUser>, OtpServiceError>> + Send;

    /// Delete the user and every code issued to them as one unit. `None` if
    /// the user row was absent (nothing is removed); otherwise the number of
    /// codes deleted with it.
    fn delete(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<u64>, OtpServiceError>> + Send;
}

/// Persistence for issued codes. Never decides transitions on its own:
/// `mark_*` and `bulk_expire` only apply to rows that are still ACTIVE.
pub trait OtpCodeRepository: Send + Sync {
    /// Fails with `CodeCollision` when another ACTIVE row holds the same code.
    fn create(&self, code: &OtpCode) -> impl Future<Output = Result<Uuid, OtpServiceError>> + Send;

    /// The ACTIVE row for `code`. Should several exist, the one expiring last
    /// wins so a stale row never shadows a live one.
    fn find_active_by_code(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<Option<OtpCode>, OtpServiceError>> + Send;

    fn find_by_id(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<OtpCode>, OtpServiceError>> + Send;

    /// ACTIVE -> USED. `false` if the row had already left ACTIVE.
    fn mark_used(&self, id: Uuid) -> impl Future<Output = Result<bool, OtpServiceError>> + Send;

    /// ACTIVE -> EXPIRED. `false` if the row had already left ACTIVE.
    fn mark_expired(&self, id: Uuid)
    -> impl Future<Output = Result<bool, OtpServiceError>> + Send;

    /// Expire every ACTIVE row with `expires_at <= now`. Returns rows changed.
    fn bulk_expire(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, OtpServiceError>> + Send;

    /// Delete every code of a user regardless of status. Returns rows deleted.
    fn delete_all_by_user(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<u64, OtpServiceError>> + Send;
}

/// Singleton policy row.
pub trait PolicyStore: Send + Sync {
    /// Fails with `PolicyNotInitialized` when no row exists.
    fn get(&self) -> impl Future<Output = Result<Policy, OtpServiceError>> + Send;

    /// Replace the stored policy as a whole.
    fn update(&self, policy: &Policy) -> impl Future<Output = Result<(), OtpServiceError>> + Send;

    /// Create the default row if absent. Returns `true` if this call created it.
    fn ensure_initialized(&self) -> impl Future<Output = Result<bool, OtpServiceError>> + Send;
}

/// Single-attempt delivery of a code to a channel-specific recipient.
pub trait CodeDispatcher: Send + Sync {
    fn deliver(
        &self,
        channel: Channel,
        recipient: &str,
        code: &str,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

impl<T: CodeDispatcher> CodeDispatcher for Arc<T> {
    fn deliver(
        &self,
        channel: Channel,
        recipient: &str,
        code: &str,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send {
        (**self).deliver(channel, recipient, code)
    }
}
