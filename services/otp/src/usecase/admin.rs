use uuid::Uuid;

use crate::domain::repository::UserDirectory;
use crate::domain::types::OtpUser;
use crate::error::OtpServiceError;

pub struct ListUsersUseCase<U: UserDirectory> {
    pub users: U,
}

impl<U: UserDirectory> ListUsersUseCase<U> {
    pub async fn execute(&self) -> Result<Vec<OtpUser>, OtpServiceError> {
        self.users.list_without_admins().await
    }
}

pub struct DeleteUserUseCase<U: UserDirectory> {
    pub users: U,
}

impl<U: UserDirectory> DeleteUserUseCase<U> {
    /// Delete a user together with every code issued to them. The directory
    /// removes both in one unit, so a failure leaves neither half applied.
    pub async fn execute(&self, user_id: Uuid) -> Result<(), OtpServiceError> {
        if !self.users.exists(user_id).await? {
            return Err(OtpServiceError::UserNotFound);
        }

        let codes = self
            .users
            .delete(user_id)
            .await?
            .ok_or(OtpServiceError::UserNotFound)?;

        tracing::info!(user_id = %user_id, codes, "user deleted");
        Ok(())
    }
}
