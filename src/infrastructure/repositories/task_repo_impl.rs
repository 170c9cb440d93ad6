// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::task::{Operation, ScrapeTask, TaskStatus};
use crate::domain::repositories::task_repository::{
    RepositoryError, TaskRepository, TaskStatistics,
};
use crate::infrastructure::database::entities::scrape_task as task_entity;
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

/// 认领竞争失败时的最大重试次数
const CLAIM_ATTEMPTS: usize = 3;

/// 任务仓库实现
///
/// 基于SeaORM实现的任务数据访问层。认领使用条件更新
/// （受影响行数判定），在任何支持原子单行更新的后端上
/// 都能保证不被并发调用者重复认领。
#[derive(Clone)]
pub struct TaskRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl TaskRepositoryImpl {
    /// 创建新的任务仓库实例
    ///
    /// # 参数
    ///
    /// * `db` - 数据库连接
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<task_entity::Model> for ScrapeTask {
    fn from(model: task_entity::Model) -> Self {
        Self {
            id: model.id,
            owner_id: model.owner_id,
            platform: model.platform.parse().unwrap_or_default(),
            operation: model.operation.parse().unwrap_or_default(),
            parameters: model.parameters,
            status: model.status.parse().unwrap_or_default(),
            result: model.result,
            error: model.error,
            created_at: model.created_at,
            updated_at: model.updated_at,
            completed_at: model.completed_at,
            lock_token: model.lock_token,
            lock_expires_at: model.lock_expires_at,
        }
    }
}

impl From<ScrapeTask> for task_entity::ActiveModel {
    fn from(task: ScrapeTask) -> Self {
        Self {
            id: Set(task.id),
            owner_id: Set(task.owner_id),
            platform: Set(task.platform.to_string()),
            operation: Set(task.operation.to_string()),
            parameters: Set(task.parameters.clone()),
            status: Set(task.status.to_string()),
            result: Set(task.result.clone()),
            error: Set(task.error.clone()),
            created_at: Set(task.created_at),
            updated_at: Set(task.updated_at),
            completed_at: Set(task.completed_at),
            lock_token: Set(task.lock_token),
            lock_expires_at: Set(task.lock_expires_at),
        }
    }
}

#[async_trait]
impl TaskRepository for TaskRepositoryImpl {
    async fn create(&self, task: &ScrapeTask) -> Result<ScrapeTask, RepositoryError> {
        let model: task_entity::ActiveModel = task.clone().into();

        model.insert(self.db.as_ref()).await?;
        Ok(task.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ScrapeTask>, RepositoryError> {
        let model = task_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;

        Ok(model.map(Into::into))
    }

    async fn claim_next(
        &self,
        worker_id: Uuid,
        lease: Duration,
    ) -> Result<Option<ScrapeTask>, RepositoryError> {
        for _ in 0..CLAIM_ATTEMPTS {
            let candidate = task_entity::Entity::find()
                .filter(task_entity::Column::Status.eq(TaskStatus::Pending.to_string()))
                .order_by_asc(task_entity::Column::CreatedAt)
                .one(self.db.as_ref())
                .await?;

            let Some(candidate) = candidate else {
                return Ok(None);
            };

            let now = Utc::now();
            // 仅当状态仍为Pending时更新才生效，受影响行数为零
            // 意味着另一个执行器抢先认领，进入下一轮重试
            let result = task_entity::Entity::update_many()
                .col_expr(
                    task_entity::Column::Status,
                    Expr::value(TaskStatus::Processing.to_string()),
                )
                .col_expr(task_entity::Column::LockToken, Expr::value(Some(worker_id)))
                .col_expr(
                    task_entity::Column::LockExpiresAt,
                    Expr::value::<Option<DateTime<FixedOffset>>>(Some((now + lease).into())),
                )
                .col_expr(
                    task_entity::Column::UpdatedAt,
                    Expr::value::<DateTime<FixedOffset>>(now.into()),
                )
                .filter(task_entity::Column::Id.eq(candidate.id))
                .filter(task_entity::Column::Status.eq(TaskStatus::Pending.to_string()))
                .exec(self.db.as_ref())
                .await?;

            if result.rows_affected == 1 {
                let claimed = self
                    .find_by_id(candidate.id)
                    .await?
                    .ok_or(RepositoryError::NotFound)?;
                return Ok(Some(claimed));
            }
        }

        Ok(None)
    }

    async fn mark_completed(
        &self,
        id: Uuid,
        result: serde_json::Value,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let updated = task_entity::Entity::update_many()
            .col_expr(
                task_entity::Column::Status,
                Expr::value(TaskStatus::Completed.to_string()),
            )
            .col_expr(task_entity::Column::Result, Expr::value(Some(result)))
            .col_expr(
                task_entity::Column::CompletedAt,
                Expr::value::<Option<DateTime<FixedOffset>>>(Some(now.into())),
            )
            .col_expr(
                task_entity::Column::UpdatedAt,
                Expr::value::<DateTime<FixedOffset>>(now.into()),
            )
            .col_expr(
                task_entity::Column::LockToken,
                Expr::value(Option::<Uuid>::None),
            )
            .col_expr(
                task_entity::Column::LockExpiresAt,
                Expr::value(Option::<DateTime<FixedOffset>>::None),
            )
            .filter(task_entity::Column::Id.eq(id))
            .filter(task_entity::Column::Status.eq(TaskStatus::Processing.to_string()))
            .exec(self.db.as_ref())
            .await?;

        if updated.rows_affected == 0 {
            // 终态任务上的重复调用是幂等空操作
            self.find_by_id(id).await?.ok_or(RepositoryError::NotFound)?;
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: String) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let updated = task_entity::Entity::update_many()
            .col_expr(
                task_entity::Column::Status,
                Expr::value(TaskStatus::Failed.to_string()),
            )
            .col_expr(task_entity::Column::Error, Expr::value(Some(error)))
            .col_expr(
                task_entity::Column::CompletedAt,
                Expr::value::<Option<DateTime<FixedOffset>>>(Some(now.into())),
            )
            .col_expr(
                task_entity::Column::UpdatedAt,
                Expr::value::<DateTime<FixedOffset>>(now.into()),
            )
            .col_expr(
                task_entity::Column::LockToken,
                Expr::value(Option::<Uuid>::None),
            )
            .col_expr(
                task_entity::Column::LockExpiresAt,
                Expr::value(Option::<DateTime<FixedOffset>>::None),
            )
            .filter(task_entity::Column::Id.eq(id))
            .filter(task_entity::Column::Status.eq(TaskStatus::Processing.to_string()))
            .exec(self.db.as_ref())
            .await?;

        if updated.rows_affected == 0 {
            self.find_by_id(id).await?.ok_or(RepositoryError::NotFound)?;
        }
        Ok(())
    }

    async fn extend_lease(
        &self,
        id: Uuid,
        worker_id: Uuid,
        lease: Duration,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now();
        // 租约已被回收时续约静默失效，执行器在complete时发现
        task_entity::Entity::update_many()
            .col_expr(
                task_entity::Column::LockExpiresAt,
                Expr::value::<Option<DateTime<FixedOffset>>>(Some((now + lease).into())),
            )
            .filter(task_entity::Column::Id.eq(id))
            .filter(task_entity::Column::LockToken.eq(worker_id))
            .filter(task_entity::Column::Status.eq(TaskStatus::Processing.to_string()))
            .exec(self.db.as_ref())
            .await?;

        Ok(())
    }

    async fn reset_to_pending(
        &self,
        id: Uuid,
        parameters: serde_json::Value,
    ) -> Result<ScrapeTask, RepositoryError> {
        let now = Utc::now();
        let updated = task_entity::Entity::update_many()
            .col_expr(
                task_entity::Column::Status,
                Expr::value(TaskStatus::Pending.to_string()),
            )
            .col_expr(task_entity::Column::Parameters, Expr::value(parameters))
            .col_expr(
                task_entity::Column::Result,
                Expr::value(Option::<serde_json::Value>::None),
            )
            .col_expr(
                task_entity::Column::Error,
                Expr::value(Option::<String>::None),
            )
            .col_expr(
                task_entity::Column::CompletedAt,
                Expr::value(Option::<DateTime<FixedOffset>>::None),
            )
            .col_expr(
                task_entity::Column::LockToken,
                Expr::value(Option::<Uuid>::None),
            )
            .col_expr(
                task_entity::Column::LockExpiresAt,
                Expr::value(Option::<DateTime<FixedOffset>>::None),
            )
            .col_expr(
                task_entity::Column::CreatedAt,
                Expr::value::<DateTime<FixedOffset>>(now.into()),
            )
            .col_expr(
                task_entity::Column::UpdatedAt,
                Expr::value::<DateTime<FixedOffset>>(now.into()),
            )
            .filter(task_entity::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;

        if updated.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }

        self.find_by_id(id).await?.ok_or(RepositoryError::NotFound)
    }

    async fn reclaim_expired(&self) -> Result<u64, RepositoryError> {
        let now = Utc::now();
        let result = task_entity::Entity::update_many()
            .col_expr(
                task_entity::Column::Status,
                Expr::value(TaskStatus::Pending.to_string()),
            )
            .col_expr(
                task_entity::Column::LockToken,
                Expr::value(Option::<Uuid>::None),
            )
            .col_expr(
                task_entity::Column::LockExpiresAt,
                Expr::value(Option::<DateTime<FixedOffset>>::None),
            )
            .col_expr(
                task_entity::Column::UpdatedAt,
                Expr::value::<DateTime<FixedOffset>>(now.into()),
            )
            .filter(task_entity::Column::Status.eq(TaskStatus::Processing.to_string()))
            .filter(task_entity::Column::LockExpiresAt.lte(now))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected)
    }

    async fn purge_terminal_older_than(
        &self,
        cutoff: DateTime<FixedOffset>,
    ) -> Result<u64, RepositoryError> {
        let result = task_entity::Entity::delete_many()
            .filter(task_entity::Column::Status.is_in(vec![
                TaskStatus::Completed.to_string(),
                TaskStatus::Failed.to_string(),
            ]))
            .filter(task_entity::Column::CompletedAt.lte(cutoff))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected)
    }

    async fn statistics_for(&self, owner_id: Uuid) -> Result<TaskStatistics, RepositoryError> {
        let mut stats = TaskStatistics::default();

        for status in [
            TaskStatus::Pending,
            TaskStatus::Processing,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            let count = task_entity::Entity::find()
                .filter(task_entity::Column::OwnerId.eq(owner_id))
                .filter(task_entity::Column::Status.eq(status.to_string()))
                .count(self.db.as_ref())
                .await?;
            match status {
                TaskStatus::Pending => stats.pending = count,
                TaskStatus::Processing => stats.processing = count,
                TaskStatus::Completed => stats.completed = count,
                TaskStatus::Failed => stats.failed = count,
            }
        }

        for operation in [Operation::Search, Operation::Details] {
            let count = task_entity::Entity::find()
                .filter(task_entity::Column::OwnerId.eq(owner_id))
                .filter(task_entity::Column::Operation.eq(operation.to_string()))
                .count(self.db.as_ref())
                .await?;
            match operation {
                Operation::Search => stats.searches = count,
                Operation::Details => stats.details = count,
            }
        }

        Ok(stats)
    }
}
