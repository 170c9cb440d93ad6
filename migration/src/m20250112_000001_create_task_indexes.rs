use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Claim scans filter on status and order by created_at
        manager
            .create_index(
                Index::create()
                    .name("idx_scrape_tasks_status_created_at")
                    .table(ScrapeTasks::Table)
                    .col(ScrapeTasks::Status)
                    .col(ScrapeTasks::CreatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Per-owner statistics lookups
        manager
            .create_index(
                Index::create()
                    .name("idx_scrape_tasks_owner_id")
                    .table(ScrapeTasks::Table)
                    .col(ScrapeTasks::OwnerId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Lease reclaim scans
        manager
            .create_index(
                Index::create()
                    .name("idx_scrape_tasks_lock_expires_at")
                    .table(ScrapeTasks::Table)
                    .col(ScrapeTasks::LockExpiresAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_scrape_tasks_status_created_at")
                    .table(ScrapeTasks::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_scrape_tasks_owner_id")
                    .table(ScrapeTasks::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_scrape_tasks_lock_expires_at")
                    .table(ScrapeTasks::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum ScrapeTasks {
    Table,
    Status,
    CreatedAt,
    OwnerId,
    LockExpiresAt,
}
