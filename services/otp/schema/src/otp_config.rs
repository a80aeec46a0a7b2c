use sea_orm::entity::prelude::*;

/// Primary key of the only row in `otp_config`.
pub const SINGLETON_ID: i16 = 1;

/// Administrator-tuned policy for newly issued codes. Exactly one row.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "otp_config")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i16,
    pub length: i32,
    pub ttl_seconds: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
