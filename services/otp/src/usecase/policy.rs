use crate::domain::repository::PolicyStore;
use crate::domain::types::Policy;
use crate::error::OtpServiceError;

pub struct GetPolicyUseCase<P: PolicyStore> {
    pub policy: P,
}

impl<P: PolicyStore> GetPolicyUseCase<P> {
    pub async fn execute(&self) -> Result<Policy, OtpServiceError> {
        self.policy.get().await
    }
}

pub struct UpdatePolicyUseCase<P: PolicyStore> {
    pub policy: P,
}

impl<P: PolicyStore> UpdatePolicyUseCase<P> {
    /// Replace the policy for codes issued from now on. Out-of-bounds values
    /// are rejected before the store is touched.
    pub async fn execute(&self, length: i32, ttl_seconds: i32) -> Result<Policy, OtpServiceError> {
        let policy = Policy::new(length, ttl_seconds)?;
        self.policy.update(&policy).await?;
        tracing::info!(length, ttl_seconds, "otp policy updated");
        Ok(policy)
    }
}
