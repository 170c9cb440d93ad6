// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::config::settings::{QuotaSettings, TierSettings};
use crate::domain::models::quota::{
    QuotaUsage, RoutingMode, SubscriberTier, TierLimits, TierTable,
};
use crate::domain::models::task::Operation;
use crate::domain::repositories::quota_repository::QuotaRepository;
use crate::utils::errors::ScrapeError;

/// 配额闸门
///
/// 每个抓取请求的入口：按订阅层级的每日限额决定接受或拒绝，
/// 接受时给出路由方式（服务端立即执行或入队延迟执行）。
/// 接受检查与计数自增由仓库层的单条条件更新原子完成。
pub struct QuotaGate {
    repository: Arc<dyn QuotaRepository>,
    tiers: TierTable,
}

impl QuotaGate {
    /// 创建新的配额闸门
    pub fn new(repository: Arc<dyn QuotaRepository>, tiers: TierTable) -> Self {
        Self { repository, tiers }
    }

    /// 由配置构建层级限额表
    pub fn tier_table(settings: &QuotaSettings) -> TierTable {
        fn limits(tier: &TierSettings) -> TierLimits {
            TierLimits {
                search_daily: tier.search_daily,
                detail_daily: tier.detail_daily,
                routing: RoutingMode::from_str(&tier.routing).unwrap_or(RoutingMode::Deferred),
            }
        }

        TierTable {
            free: limits(&settings.free),
            basic: limits(&settings.basic),
            pro: limits(&settings.pro),
            enterprise: limits(&settings.enterprise),
        }
    }

    /// 只读检查当前计数是否仍在限额内
    ///
    /// 无副作用；实际接受必须走route_and_accept
    pub async fn can_accept(
        &self,
        owner_id: Uuid,
        tier: SubscriberTier,
        operation: Operation,
    ) -> Result<bool, ScrapeError> {
        let limits = self.tiers.limits(tier);
        let usage = self.usage(owner_id, tier).await?;
        let used = match operation {
            Operation::Search => usage.search_used,
            Operation::Details => usage.detail_used,
        };
        Ok(used < limits.limit_for(operation))
    }

    /// 原子接受并返回路由方式
    ///
    /// 拒绝时返回QuotaExceeded且无任何副作用；接受时计数
    /// 已完成自增，随后才开始执行或入队
    pub async fn route_and_accept(
        &self,
        owner_id: Uuid,
        tier: SubscriberTier,
        operation: Operation,
    ) -> Result<RoutingMode, ScrapeError> {
        let limits = self.tiers.limits(tier);
        let accepted = self
            .repository
            .try_increment(owner_id, tier, operation, limits.limit_for(operation))
            .await?;

        if !accepted {
            metrics::counter!("quota_rejections_total", "operation" => operation.to_string())
                .increment(1);
            return Err(ScrapeError::QuotaExceeded(operation.to_string()));
        }

        debug!(
            "Accepted {} for owner {} ({} tier, routing {:?})",
            operation, owner_id, tier, limits.routing
        );
        Ok(limits.routing)
    }

    /// 当前用量、限额、余量与重置时间
    pub async fn usage(
        &self,
        owner_id: Uuid,
        tier: SubscriberTier,
    ) -> Result<QuotaUsage, ScrapeError> {
        let counter = self.repository.find_by_owner(owner_id).await?;
        let limits = self.tiers.limits(tier);
        Ok(QuotaUsage::build(
            owner_id,
            tier,
            counter.as_ref(),
            limits,
            Utc::now(),
        ))
    }
}
