use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create scrape_tasks table
        manager
            .create_table(
                Table::create()
                    .table(ScrapeTasks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ScrapeTasks::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ScrapeTasks::OwnerId).uuid().not_null())
                    .col(ColumnDef::new(ScrapeTasks::Platform).string().not_null())
                    .col(ColumnDef::new(ScrapeTasks::Operation).string().not_null())
                    .col(ColumnDef::new(ScrapeTasks::Parameters).json().not_null())
                    .col(ColumnDef::new(ScrapeTasks::Status).string().not_null())
                    .col(ColumnDef::new(ScrapeTasks::Result).json())
                    .col(ColumnDef::new(ScrapeTasks::Error).string())
                    .col(
                        ColumnDef::new(ScrapeTasks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ScrapeTasks::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(ScrapeTasks::CompletedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(ScrapeTasks::LockToken).uuid())
                    .col(ColumnDef::new(ScrapeTasks::LockExpiresAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ScrapeTasks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ScrapeTasks {
    Table,
    Id,
    OwnerId,
    Platform,
    Operation,
    Parameters,
    Status,
    Result,
    Error,
    CreatedAt,
    UpdatedAt,
    CompletedAt,
    LockToken,
    LockExpiresAt,
}
