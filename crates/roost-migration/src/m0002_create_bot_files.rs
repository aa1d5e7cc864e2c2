use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BotFiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BotFiles::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BotFiles::BotId).string().not_null())
                    .col(ColumnDef::new(BotFiles::Filename).string().not_null())
                    .col(ColumnDef::new(BotFiles::Content).text().not_null())
                    .col(ColumnDef::new(BotFiles::SizeBytes).big_integer().not_null())
                    .col(
                        ColumnDef::new(BotFiles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(BotFiles::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .index(
                        Index::create()
                            .name("idx_bot_files_bot_filename_unique")
                            .table(BotFiles::Table)
                            .col(BotFiles::BotId)
                            .col(BotFiles::Filename)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BotFiles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum BotFiles {
    Table,
    Id,
    BotId,
    Filename,
    Content,
    SizeBytes,
    CreatedAt,
    UpdatedAt,
}
