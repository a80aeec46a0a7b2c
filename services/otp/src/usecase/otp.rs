use chrono::Utc;
use rand::RngExt;
use uuid::Uuid;

use crate::domain::repository::{CodeDispatcher, OtpCodeRepository, PolicyStore, UserDirectory};
use crate::domain::types::{Channel, OtpCode, OtpStatus, Policy};
use crate::error::OtpServiceError;
use crate::sweeper::ExpirySweep;

/// Draws per issue before giving up with `CodeCollision`.
pub const MAX_CODE_ATTEMPTS: u32 = 5;

/// `length` uniformly random decimal digits; leading zeros are kept.
pub fn generate_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// Issues, validates and expires one-time codes.
///
/// Consumption is decided by the repository's conditional update alone, so the
/// engine holds no locks and is shared freely between request tasks and the
/// sweeper.
pub struct OtpEngine<U, C, P, N>
where
    U: UserDirectory,
    C: OtpCodeRepository,
    P: PolicyStore,
    N: CodeDispatcher,
{
    pub users: U,
    pub codes: C,
    pub policy: P,
    pub dispatcher: N,
}

impl<U, C, P, N> OtpEngine<U, C, P, N>
where
    U: UserDirectory,
    C: OtpCodeRepository,
    P: PolicyStore,
    N: CodeDispatcher,
{
    /// Create an ACTIVE code for `user_id` and deliver it over `channel`.
    ///
    /// The code is persisted before delivery and never shares its string with
    /// another ACTIVE code. If delivery fails the error is returned and the
    /// stored code stays ACTIVE until it expires.
    pub async fn generate_and_send(
        &self,
        user_id: Uuid,
        operation_id: &str,
        channel: Channel,
    ) -> Result<OtpCode, OtpServiceError> {
        // 1. Resolve user and their address for the channel
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(OtpServiceError::UserNotFound)?;
        let recipient = user
            .address_for(channel)
            .ok_or(OtpServiceError::UnsupportedChannel(channel))?
            .to_owned();

        // 2. Policy in effect right now fixes length and expiry for good
        let policy = self.policy.get().await?;
        let otp = self.create_unique(user_id, operation_id, channel, &policy).await?;

        // 3. Deliver the persisted code
        self.dispatcher.deliver(channel, &recipient, &otp.code).await?;

        tracing::info!(
            user_id = %user_id,
            operation_id,
            %channel,
            expires_at = %otp.expires_at,
            "otp issued"
        );
        Ok(otp)
    }

    /// Persist a fresh ACTIVE code, drawing a new one whenever the store
    /// reports that the string is already ACTIVE.
    async fn create_unique(
        &self,
        user_id: Uuid,
        operation_id: &str,
        channel: Channel,
        policy: &Policy,
    ) -> Result<OtpCode, OtpServiceError> {
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let now = Utc::now();
            let otp = OtpCode {
                id: Uuid::now_v7(),
                user_id,
                operation_id: operation_id.to_owned(),
                code: generate_code(policy.length() as usize),
                channel,
                status: OtpStatus::Active,
                created_at: now,
                expires_at: now + policy.ttl(),
            };
            match self.codes.create(&otp).await {
                Ok(_) => return Ok(otp),
                Err(OtpServiceError::CodeCollision) => {
                    tracing::debug!(attempt, "generated code already active, drawing again");
                }
                Err(e) => return Err(e),
            }
        }
        Err(OtpServiceError::CodeCollision)
    }

    /// `true` exactly once per issued code: for the first caller that moves it
    /// from ACTIVE to USED before its expiry. Unknown, used and expired codes
    /// yield `false`; only storage failures are errors.
    pub async fn validate(&self, code: &str) -> Result<bool, OtpServiceError> {
        if code.is_empty() {
            return Ok(false);
        }
        let Some(otp) = self.codes.find_active_by_code(code).await? else {
            return Ok(false);
        };

        if otp.is_expired_at(Utc::now()) {
            // Losing this race to the sweeper is fine; the answer is `false` either way.
            match self.codes.mark_expired(otp.id).await {
                Ok(changed) => tracing::debug!(otp_id = %otp.id, changed, "expired code presented"),
                Err(e) => tracing::warn!(otp_id = %otp.id, error = %e, "failed to expire code"),
            }
            return Ok(false);
        }

        let used = self.codes.mark_used(otp.id).await?;
        if used {
            tracing::info!(otp_id = %otp.id, user_id = %otp.user_id, "otp validated");
        }
        Ok(used)
    }

    /// Expire every ACTIVE code past its expiry. Returns how many changed.
    pub async fn mark_expired_otps(&self) -> Result<u64, OtpServiceError> {
        let count = self.codes.bulk_expire(Utc::now()).await?;
        if count > 0 {
            tracing::info!(count, "expired otp codes");
        } else {
            tracing::debug!("no otp codes to expire");
        }
        Ok(count)
    }
}

impl<U, C, P, N> ExpirySweep for OtpEngine<U, C, P, N>
where
    U: UserDirectory,
    C: OtpCodeRepository,
    P: PolicyStore,
    N: CodeDispatcher,
{
    async fn sweep(&self) -> Result<u64, OtpServiceError> {
        self.mark_expired_otps().await
    }
}
