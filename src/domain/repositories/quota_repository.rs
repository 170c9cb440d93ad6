// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::quota::{QuotaCounter, SubscriberTier};
use crate::domain::models::task::Operation;
use crate::domain::repositories::task_repository::RepositoryError;
use async_trait::async_trait;
use uuid::Uuid;

/// 配额仓库特质
///
/// 计数器的接受检查与自增必须是同一个原子条件更新，
/// 防止同一订阅者的并发请求突破每日限额。
#[async_trait]
pub trait QuotaRepository: Send + Sync {
    /// 查找订阅者的计数器
    async fn find_by_owner(&self, owner_id: Uuid)
        -> Result<Option<QuotaCounter>, RepositoryError>;

    /// 原子接受并自增
    ///
    /// 条件更新在过滤器中带上 `count < limit`，当日计数器
    /// 缺失时懒创建，窗口过期时先滚动归零再重试。
    ///
    /// # 返回值
    ///
    /// * `Ok(true)` - 已接受并计数
    /// * `Ok(false)` - 当日限额已满
    async fn try_increment(
        &self,
        owner_id: Uuid,
        tier: SubscriberTier,
        operation: Operation,
        limit: u32,
    ) -> Result<bool, RepositoryError>;

    /// 滚动所有窗口已过期的计数器，返回受影响数量
    async fn rollover_expired(&self) -> Result<u64, RepositoryError>;
}
