// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::task::ScrapeTask;
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset};
use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// 记录未找到
    #[error("Record not found")]
    NotFound,
}

/// 按状态和操作类型汇总的任务统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskStatistics {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub searches: u64,
    pub details: u64,
}

/// 任务仓库特质
///
/// 定义任务数据访问接口。认领必须是存储层的原子条件更新，
/// 这是跨执行器进程的唯一协调点。
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 创建新任务
    async fn create(&self, task: &ScrapeTask) -> Result<ScrapeTask, RepositoryError>;

    /// 根据ID查找任务
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ScrapeTask>, RepositoryError>;

    /// 原子认领下一个待处理任务
    ///
    /// 按created_at从最旧开始，条件更新将其置为Processing并
    /// 写入租约；受影响行数为零意味着竞争失败，内部重试。
    /// 保证并发调用者不会认领到同一任务。
    async fn claim_next(
        &self,
        worker_id: Uuid,
        lease: Duration,
    ) -> Result<Option<ScrapeTask>, RepositoryError>;

    /// 标记任务已完成并写入结果；对终态任务为幂等空操作
    async fn mark_completed(
        &self,
        id: Uuid,
        result: serde_json::Value,
    ) -> Result<(), RepositoryError>;

    /// 标记任务已失败并写入错误；对终态任务为幂等空操作
    async fn mark_failed(&self, id: Uuid, error: String) -> Result<(), RepositoryError>;

    /// 续约执行中任务的租约
    async fn extend_lease(
        &self,
        id: Uuid,
        worker_id: Uuid,
        lease: Duration,
    ) -> Result<(), RepositoryError>;

    /// 将终态的详情任务重置为待处理（同一确定性ID的重新请求）
    async fn reset_to_pending(
        &self,
        id: Uuid,
        parameters: serde_json::Value,
    ) -> Result<ScrapeTask, RepositoryError>;

    /// 回收租约过期的Processing任务，重新置为Pending
    async fn reclaim_expired(&self) -> Result<u64, RepositoryError>;

    /// 删除早于截止时间的终态任务，返回删除数量
    async fn purge_terminal_older_than(
        &self,
        cutoff: DateTime<FixedOffset>,
    ) -> Result<u64, RepositoryError>;

    /// 按订阅者汇总任务统计
    async fn statistics_for(&self, owner_id: Uuid) -> Result<TaskStatistics, RepositoryError>;
}
