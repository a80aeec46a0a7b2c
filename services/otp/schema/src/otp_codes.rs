use sea_orm::entity::prelude::*;

/// Partial unique index over `code` for rows in `ACTIVE` status.
pub const ACTIVE_CODE_INDEX: &str = "uq_otp_codes_active_code";

/// One-time passcode bound to a user and an operation.
/// `status` is one of `ACTIVE`, `USED`, `EXPIRED`; `channel` one of
/// `EMAIL`, `SMS`, `TELEGRAM`, `FILE`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "otp_codes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub operation_id: String,
    pub code: String,
    pub channel: String,
    pub status: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    User,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
