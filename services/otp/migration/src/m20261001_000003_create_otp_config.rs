use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Single-row table; the service always writes id = 1.
        manager
            .create_table(
                Table::create()
                    .table(OtpConfig::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OtpConfig::Id)
                            .small_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OtpConfig::Length).integer().not_null())
                    .col(ColumnDef::new(OtpConfig::TtlSeconds).integer().not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OtpConfig::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum OtpConfig {
    Table,
    Id,
    Length,
    TtlSeconds,
}
