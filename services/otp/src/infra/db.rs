use anyhow::{Context as _, anyhow};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, SqlErr, TransactionError, TransactionTrait,
    TryInsertResult,
};
use uuid::Uuid;

use otpgate_auth_types::ROLE_ADMIN;
use otpgate_otp_schema::{otp_codes, otp_config, users};

use crate::domain::repository::{OtpCodeRepository, PolicyStore, UserDirectory};
use crate::domain::types::{OtpCode, OtpStatus, OtpUser, Policy};
use crate::error::OtpServiceError;

// ── User directory ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbUserDirectory {
    pub db: DatabaseConnection,
}

impl UserDirectory for DbUserDirectory {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<OtpUser>, OtpServiceError> {
        let model = users::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .context("find user by id")?;
        Ok(model.map(user_from_model).transpose()?)
    }

    async fn exists(&self, id: Uuid) -> Result<bool, OtpServiceError> {
        let count = users::Entity::find_by_id(id)
            .count(&self.db)
            .await
            .context("check user exists")?;
        Ok(count > 0)
    }

    async fn list_without_admins(&self) -> Result<Vec<OtpUser>, OtpServiceError> {
        let models = users::Entity::find()
            .filter(users::Column::Role.lt(i16::from(ROLE_ADMIN)))
            .order_by_asc(users::Column::CreatedAt)
            .all(&self.db)
            .await
            .context("list users")?;
        let users = models
            .into_iter()
            .map(user_from_model)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(users)
    }

    async fn delete(&self, id: Uuid) -> Result<Option<u64>, OtpServiceError> {
        let result = self
            .db
            .transaction::<_, u64, DbErr>(|txn| {
                Box::pin(async move {
                    let codes = delete_codes_of(txn, id).await?;
                    let deleted = users::Entity::delete_by_id(id).exec(txn).await?;
                    if deleted.rows_affected == 0 {
                        // Err rolls the code delete back.
                        return Err(DbErr::RecordNotFound(format!("user {id}")));
                    }
                    Ok(codes)
                })
            })
            .await;

        match result {
            Ok(codes) => Ok(Some(codes)),
            Err(TransactionError::Transaction(DbErr::RecordNotFound(_))) => Ok(None),
            Err(e) => Err(anyhow::Error::new(e).context("delete user").into()),
        }
    }
}

fn user_from_model(model: users::Model) -> anyhow::Result<OtpUser> {
    let role = u8::try_from(model.role)
        .with_context(|| format!("user {} has out-of-range role {}", model.id, model.role))?;
    Ok(OtpUser {
        id: model.id,
        username: model.username,
        role,
        email: model.email,
        phone: model.phone,
        telegram_chat_id: model.telegram_chat_id,
        created_at: model.created_at,
    })
}

// ── OTP code repository ───────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbOtpCodeRepository {
    pub db: DatabaseConnection,
}

impl DbOtpCodeRepository {
    /// Move one row out of ACTIVE. The status guard in the WHERE clause makes
    /// concurrent callers race on the row itself: exactly one sees a change.
    async fn transition(&self, id: Uuid, next: OtpStatus) -> Result<bool, OtpServiceError> {
        let result = otp_codes::Entity::update_many()
            .col_expr(otp_codes::Column::Status, Expr::value(next.as_str()))
            .filter(otp_codes::Column::Id.eq(id))
            .filter(otp_codes::Column::Status.eq(OtpStatus::Active.as_str()))
            .exec(&self.db)
            .await
            .with_context(|| format!("mark otp {}", next.as_str()))?;
        Ok(result.rows_affected == 1)
    }
}

async fn delete_codes_of<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> Result<u64, DbErr> {
    let result = otp_codes::Entity::delete_many()
        .filter(otp_codes::Column::UserId.eq(user_id))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

/// Whether `err` is the partial unique index on ACTIVE codes rejecting a row.
fn is_active_code_conflict(err: &DbErr) -> bool {
    matches!(
        err.sql_err(),
        Some(SqlErr::UniqueConstraintViolation(msg)) if msg.contains(otp_codes::ACTIVE_CODE_INDEX)
    )
}

impl OtpCodeRepository for DbOtpCodeRepository {
    async fn create(&self, code: &OtpCode) -> Result<Uuid, OtpServiceError> {
        let result = otp_codes::Entity::insert(otp_codes::ActiveModel {
            id: Set(code.id),
            user_id: Set(code.user_id),
            operation_id: Set(code.operation_id.clone()),
            code: Set(code.code.clone()),
            channel: Set(code.channel.as_str().to_owned()),
            status: Set(code.status.as_str().to_owned()),
            created_at: Set(code.created_at),
            expires_at: Set(code.expires_at),
        })
        .exec_without_returning(&self.db)
        .await;

        match result {
            Ok(_) => Ok(code.id),
            Err(e) if is_active_code_conflict(&e) => Err(OtpServiceError::CodeCollision),
            Err(e) => Err(anyhow::Error::new(e).context("create otp code").into()),
        }
    }

    async fn find_active_by_code(&self, code: &str) -> Result<Option<OtpCode>, OtpServiceError> {
        let model = otp_codes::Entity::find()
            .filter(otp_codes::Column::Code.eq(code))
            .filter(otp_codes::Column::Status.eq(OtpStatus::Active.as_str()))
            .order_by_desc(otp_codes::Column::ExpiresAt)
            .one(&self.db)
            .await
            .context("find active otp by code")?;
        Ok(model.map(otp_from_model).transpose()?)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OtpCode>, OtpServiceError> {
        let model = otp_codes::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .context("find otp by id")?;
        Ok(model.map(otp_from_model).transpose()?)
    }

    async fn mark_used(&self, id: Uuid) -> Result<bool, OtpServiceError> {
        self.transition(id, OtpStatus::Used).await
    }

    async fn mark_expired(&self, id: Uuid) -> Result<bool, OtpServiceError> {
        self.transition(id, OtpStatus::Expired).await
    }

    async fn bulk_expire(&self, now: DateTime<Utc>) -> Result<u64, OtpServiceError> {
        let result = otp_codes::Entity::update_many()
            .col_expr(
                otp_codes::Column::Status,
                Expr::value(OtpStatus::Expired.as_str()),
            )
            .filter(otp_codes::Column::Status.eq(OtpStatus::Active.as_str()))
            .filter(otp_codes::Column::ExpiresAt.lte(now))
            .exec(&self.db)
            .await
            .context("bulk expire otp codes")?;
        Ok(result.rows_affected)
    }

    async fn delete_all_by_user(&self, user_id: Uuid) -> Result<u64, OtpServiceError> {
        Ok(delete_codes_of(&self.db, user_id)
            .await
            .context("delete otp codes by user")?)
    }
}

fn otp_from_model(model: otp_codes::Model) -> anyhow::Result<OtpCode> {
    let channel = model
        .channel
        .parse()
        .map_err(|_| anyhow!("otp {} has unknown channel {}", model.id, model.channel))?;
    let status = model
        .status
        .parse()
        .with_context(|| format!("otp {} status", model.id))?;
    Ok(OtpCode {
        id: model.id,
        user_id: model.user_id,
        operation_id: model.operation_id,
        code: model.code,
        channel,
        status,
        created_at: model.created_at,
        expires_at: model.expires_at,
    })
}

// ── Policy store ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbPolicyStore {
    pub db: DatabaseConnection,
}

fn policy_row(policy: &Policy) -> otp_config::ActiveModel {
    otp_config::ActiveModel {
        id: Set(otp_config::SINGLETON_ID),
        length: Set(policy.length()),
        ttl_seconds: Set(policy.ttl_seconds()),
    }
}

impl PolicyStore for DbPolicyStore {
    async fn get(&self) -> Result<Policy, OtpServiceError> {
        let model = otp_config::Entity::find_by_id(otp_config::SINGLETON_ID)
            .one(&self.db)
            .await
            .context("load otp policy")?
            .ok_or(OtpServiceError::PolicyNotInitialized)?;
        let policy = Policy::new(model.length, model.ttl_seconds)
            .map_err(|e| anyhow!("stored otp policy is out of bounds: {e}"))?;
        Ok(policy)
    }

    async fn update(&self, policy: &Policy) -> Result<(), OtpServiceError> {
        otp_config::Entity::insert(policy_row(policy))
            .on_conflict(
                OnConflict::column(otp_config::Column::Id)
                    .update_columns([otp_config::Column::Length, otp_config::Column::TtlSeconds])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .context("update otp policy")?;
        Ok(())
    }

    async fn ensure_initialized(&self) -> Result<bool, OtpServiceError> {
        let result = otp_config::Entity::insert(policy_row(&Policy::default()))
            .on_conflict(
                OnConflict::column(otp_config::Column::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .do_nothing()
            .exec_without_returning(&self.db)
            .await;

        match result {
            Ok(TryInsertResult::Inserted(rows)) => Ok(rows > 0),
            Ok(TryInsertResult::Conflicted | TryInsertResult::Empty) => Ok(false),
            // Another instance won the race between our check and insert.
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Ok(false)
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context("initialize otp policy")
                .into()),
        }
    }
}
