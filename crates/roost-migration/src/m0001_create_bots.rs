use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Bots::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Bots::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Bots::OwnerId).string().not_null())
                    .col(ColumnDef::new(Bots::Name).string().not_null())
                    .col(ColumnDef::new(Bots::Runtime).string().not_null())
                    .col(ColumnDef::new(Bots::MainFile).string().null())
                    .col(ColumnDef::new(Bots::Token).string().not_null())
                    .col(
                        ColumnDef::new(Bots::Status)
                            .string()
                            .not_null()
                            .default("stopped"),
                    )
                    .col(ColumnDef::new(Bots::Pid).integer().null())
                    .col(
                        ColumnDef::new(Bots::Memory)
                            .string()
                            .not_null()
                            .default("0MB"),
                    )
                    .col(ColumnDef::new(Bots::Cpu).string().not_null().default("0%"))
                    .col(
                        ColumnDef::new(Bots::Uptime)
                            .string()
                            .not_null()
                            .default("0s"),
                    )
                    .col(
                        ColumnDef::new(Bots::LastStart)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Bots::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Bots::UpdatedAt)
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
                    .name("idx_bots_owner")
                    .table(Bots::Table)
                    .col(Bots::OwnerId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Bots::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Bots {
    Table,
    Id,
    OwnerId,
    Name,
    Runtime,
    MainFile,
    Token,
    Status,
    Pid,
    Memory,
    Cpu,
    Uptime,
    LastStart,
    CreatedAt,
    UpdatedAt,
}
