// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::task::{Operation, ScrapeTask};
use crate::domain::repositories::task_repository::{TaskRepository, TaskStatistics};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// 仓库错误
    #[error("Repository error: {0}")]
    Repository(#[from] crate::domain::repositories::task_repository::RepositoryError),
}

/// 任务队列特质
///
/// 延迟执行抓取工作的持久化记录，也是跨执行器进程
/// 唯一共享的协调点
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// 入队任务
    ///
    /// 详情任务按确定性ID去重：已存在同ID的非终态任务时
    /// 直接返回该任务而不是新建
    async fn enqueue(&self, task: ScrapeTask) -> Result<ScrapeTask, QueueError>;

    /// 查询任务
    async fn status(&self, task_id: Uuid) -> Result<Option<ScrapeTask>, QueueError>;

    /// 原子认领下一个待处理任务
    async fn claim_next(&self, worker_id: Uuid) -> Result<Option<ScrapeTask>, QueueError>;

    /// 完成任务
    async fn complete(&self, task_id: Uuid, result: serde_json::Value)
        -> Result<(), QueueError>;

    /// 失败任务
    async fn fail(&self, task_id: Uuid, error: String) -> Result<(), QueueError>;

    /// 续约任务租约
    async fn extend_lease(&self, task_id: Uuid, worker_id: Uuid) -> Result<(), QueueError>;

    /// 按订阅者汇总任务统计
    async fn statistics_for(&self, owner_id: Uuid) -> Result<TaskStatistics, QueueError>;

    /// 删除保留期之外的终态任务
    async fn purge_older_than(&self, retention: Duration) -> Result<u64, QueueError>;

    /// 回收租约过期的任务
    async fn reclaim_expired(&self) -> Result<u64, QueueError>;
}

/// 数据库任务队列实现
pub struct DatabaseTaskQueue<R: TaskRepository> {
    /// 任务仓库
    repository: Arc<R>,
    /// 认领时授予的租约时长
    lease: Duration,
}

impl<R: TaskRepository> DatabaseTaskQueue<R> {
    /// 创建新的数据库任务队列实例
    ///
    /// # 参数
    ///
    /// * `repository` - 任务仓库
    /// * `lease` - 认领时授予的租约时长
    pub fn new(repository: Arc<R>, lease: Duration) -> Self {
        Self { repository, lease }
    }
}

#[async_trait]
impl<R: TaskRepository> TaskQueue for DatabaseTaskQueue<R> {
    async fn enqueue(&self, task: ScrapeTask) -> Result<ScrapeTask, QueueError> {
        if task.operation == Operation::Details {
            if let Some(existing) = self.repository.find_by_id(task.id).await? {
                if !existing.is_terminal() {
                    debug!(
                        "Details task {} already pending, returning existing",
                        existing.id
                    );
                    return Ok(existing);
                }
                // 同一职位的重新请求复用确定性ID，重置终态行
                let reopened = self
                    .repository
                    .reset_to_pending(task.id, task.parameters.clone())
                    .await?;
                return Ok(reopened);
            }
        }

        let created = self.repository.create(&task).await?;
        Ok(created)
    }

    async fn status(&self, task_id: Uuid) -> Result<Option<ScrapeTask>, QueueError> {
        let task = self.repository.find_by_id(task_id).await?;
        Ok(task)
    }

    async fn claim_next(&self, worker_id: Uuid) -> Result<Option<ScrapeTask>, QueueError> {
        let task = self.repository.claim_next(worker_id, self.lease).await?;
        Ok(task)
    }

    async fn complete(
        &self,
        task_id: Uuid,
        result: serde_json::Value,
    ) -> Result<(), QueueError> {
        self.repository.mark_completed(task_id, result).await?;
        Ok(())
    }

    async fn fail(&self, task_id: Uuid, error: String) -> Result<(), QueueError> {
        self.repository.mark_failed(task_id, error).await?;
        Ok(())
    }

    async fn extend_lease(&self, task_id: Uuid, worker_id: Uuid) -> Result<(), QueueError> {
        self.repository
            .extend_lease(task_id, worker_id, self.lease)
            .await?;
        Ok(())
    }

    async fn statistics_for(&self, owner_id: Uuid) -> Result<TaskStatistics, QueueError> {
        let stats = self.repository.statistics_for(owner_id).await?;
        Ok(stats)
    }

    async fn purge_older_than(&self, retention: Duration) -> Result<u64, QueueError> {
        let cutoff = (Utc::now() - retention).into();
        let removed = self.repository.purge_terminal_older_than(cutoff).await?;
        Ok(removed)
    }

    async fn reclaim_expired(&self) -> Result<u64, QueueError> {
        let reclaimed = self.repository.reclaim_expired().await?;
        Ok(reclaimed)
    }
}

#[async_trait]
impl<T: TaskQueue + ?Sized> TaskQueue for Arc<T> {
    async fn enqueue(&self, task: ScrapeTask) -> Result<ScrapeTask, QueueError> {
        (**self).enqueue(task).await
    }

    async fn status(&self, task_id: Uuid) -> Result<Option<ScrapeTask>, QueueError> {
        (**self).status(task_id).await
    }

    async fn claim_next(&self, worker_id: Uuid) -> Result<Option<ScrapeTask>, QueueError> {
        (**self).claim_next(worker_id).await
    }

    async fn complete(
        &self,
        task_id: Uuid,
        result: serde_json::Value,
    ) -> Result<(), QueueError> {
        (**self).complete(task_id, result).await
    }

    async fn fail(&self, task_id: Uuid, error: String) -> Result<(), QueueError> {
        (**self).fail(task_id, error).await
    }

    async fn extend_lease(&self, task_id: Uuid, worker_id: Uuid) -> Result<(), QueueError> {
        (**self).extend_lease(task_id, worker_id).await
    }

    async fn statistics_for(&self, owner_id: Uuid) -> Result<TaskStatistics, QueueError> {
        (**self).statistics_for(owner_id).await
    }

    async fn purge_older_than(&self, retention: Duration) -> Result<u64, QueueError> {
        (**self).purge_older_than(retention).await
    }

    async fn reclaim_expired(&self) -> Result<u64, QueueError> {
        (**self).reclaim_expired().await
    }
}
