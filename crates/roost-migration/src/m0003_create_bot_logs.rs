use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BotLogs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(BotLogs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(BotLogs::BotId).string().not_null())
                    .col(
                        ColumnDef::new(BotLogs::Level)
                            .string()
                            .not_null()
                            .default("info"),
                    )
                    .col(ColumnDef::new(BotLogs::Message).text().not_null())
                    .col(
                        ColumnDef::new(BotLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_bot_logs_bot")
                    .table(BotLogs::Table)
                    .col(BotLogs::BotId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BotLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum BotLogs {
    Table,
    Id,
    BotId,
    Level,
    Message,
    CreatedAt,
}
