use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::infra::db::{DbOtpCodeRepository, DbPolicyStore, DbUserDirectory};
use crate::notify::NotificationDispatcher;
use crate::usecase::otp::OtpEngine;

/// Engine wired to the database-backed ports.
pub type AppEngine =
    OtpEngine<DbUserDirectory, DbOtpCodeRepository, DbPolicyStore, Arc<NotificationDispatcher>>;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub dispatcher: Arc<NotificationDispatcher>,
}

impl AppState {
    pub fn user_directory(&self) -> DbUserDirectory {
        DbUserDirectory {
            db: self.db.clone(),
        }
    }

    pub fn otp_repo(&self) -> DbOtpCodeRepository {
        DbOtpCodeRepository {
            db: self.db.clone(),
        }
    }

    pub fn policy_store(&self) -> DbPolicyStore {
        DbPolicyStore {
            db: self.db.clone(),
        }
    }

    pub fn engine(&self) -> AppEngine {
        OtpEngine {
            users: self.user_directory(),
            codes: self.otp_repo(),
            policy: self.policy_store(),
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}
