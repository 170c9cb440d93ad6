// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::quota::{window_start_for, QuotaCounter, SubscriberTier};
use crate::domain::models::task::Operation;
use crate::domain::repositories::quota_repository::QuotaRepository;
use crate::domain::repositories::task_repository::RepositoryError;
use crate::infrastructure::database::entities::quota_counter as quota_entity;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// 懒创建/滚动竞争下的自增重试次数
const INCREMENT_ATTEMPTS: usize = 3;

/// 配额仓库实现
///
/// 接受检查与自增合并为一条带 `count < limit` 过滤器的
/// 条件更新，并发突发请求不可能使计数越过限额。
#[derive(Clone)]
pub struct QuotaRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl QuotaRepositoryImpl {
    /// 创建新的配额仓库实例
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// 将过期窗口滚动到当日并清零计数
    async fn rollover_owner(
        &self,
        owner_id: Uuid,
        window: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = quota_entity::Entity::update_many()
            .col_expr(quota_entity::Column::SearchCount, Expr::value(0))
            .col_expr(quota_entity::Column::DetailCount, Expr::value(0))
            .col_expr(
                quota_entity::Column::WindowStart,
                Expr::value::<DateTime<FixedOffset>>(window.into()),
            )
            .col_expr(
                quota_entity::Column::UpdatedAt,
                Expr::value::<DateTime<FixedOffset>>(Utc::now().into()),
            )
            .filter(quota_entity::Column::OwnerId.eq(owner_id))
            .filter(quota_entity::Column::WindowStart.lt(window))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected)
    }
}

impl From<quota_entity::Model> for QuotaCounter {
    fn from(model: quota_entity::Model) -> Self {
        Self {
            owner_id: model.owner_id,
            tier: SubscriberTier::from_str(&model.tier).unwrap_or(SubscriberTier::Free),
            search_count: model.search_count.max(0) as u32,
            detail_count: model.detail_count.max(0) as u32,
            window_start: model.window_start.into(),
            updated_at: model.updated_at.into(),
        }
    }
}

#[async_trait]
impl QuotaRepository for QuotaRepositoryImpl {
    async fn find_by_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Option<QuotaCounter>, RepositoryError> {
        let model = quota_entity::Entity::find_by_id(owner_id)
            .one(self.db.as_ref())
            .await?;

        Ok(model.map(Into::into))
    }

    async fn try_increment(
        &self,
        owner_id: Uuid,
        tier: SubscriberTier,
        operation: Operation,
        limit: u32,
    ) -> Result<bool, RepositoryError> {
        let window = window_start_for(Utc::now());
        let count_column = match operation {
            Operation::Search => quota_entity::Column::SearchCount,
            Operation::Details => quota_entity::Column::DetailCount,
        };

        for _ in 0..INCREMENT_ATTEMPTS {
            // 单条条件更新同时完成接受检查与自增
            let result = quota_entity::Entity::update_many()
                .col_expr(count_column, Expr::col(count_column).add(1))
                .col_expr(
                    quota_entity::Column::UpdatedAt,
                    Expr::value::<DateTime<FixedOffset>>(Utc::now().into()),
                )
                .filter(quota_entity::Column::OwnerId.eq(owner_id))
                .filter(quota_entity::Column::WindowStart.eq::<DateTime<FixedOffset>>(window.into()))
                .filter(count_column.lt(limit as i32))
                .exec(self.db.as_ref())
                .await?;

            if result.rows_affected == 1 {
                return Ok(true);
            }

            // 更新未命中：计数器缺失、窗口过期或限额已满
            match self.find_by_owner(owner_id).await? {
                Some(counter) if counter.window_start >= window => {
                    return Ok(false);
                }
                Some(_) => {
                    debug!("Rolling over quota window for owner {}", owner_id);
                    self.rollover_owner(owner_id, window).await?;
                }
                None => {
                    let model = quota_entity::ActiveModel {
                        owner_id: Set(owner_id),
                        tier: Set(tier.to_string()),
                        search_count: Set(0),
                        detail_count: Set(0),
                        window_start: Set(window.into()),
                        updated_at: Set(Utc::now().into()),
                    };
                    // 并发懒创建可能撞主键，忽略后重试自增
                    if let Err(e) = model.insert(self.db.as_ref()).await {
                        debug!("Quota counter insert race for owner {}: {}", owner_id, e);
                    }
                }
            }
        }

        Ok(false)
    }

    async fn rollover_expired(&self) -> Result<u64, RepositoryError> {
        let window = window_start_for(Utc::now());
        let result = quota_entity::Entity::update_many()
            .col_expr(quota_entity::Column::SearchCount, Expr::value(0))
            .col_expr(quota_entity::Column::DetailCount, Expr::value(0))
            .col_expr(
                quota_entity::Column::WindowStart,
                Expr::value::<DateTime<FixedOffset>>(window.into()),
            )
            .col_expr(
                quota_entity::Column::UpdatedAt,
                Expr::value::<DateTime<FixedOffset>>(Utc::now().into()),
            )
            .filter(quota_entity::Column::WindowStart.lt::<DateTime<FixedOffset>>(window.into()))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected)
    }
}
