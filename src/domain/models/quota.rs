// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::models::task::Operation;

/// 订阅层级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriberTier {
    Free,
    Basic,
    Pro,
    Enterprise,
}

impl fmt::Display for SubscriberTier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SubscriberTier::Free => write!(f, "free"),
            SubscriberTier::Basic => write!(f, "basic"),
            SubscriberTier::Pro => write!(f, "pro"),
            SubscriberTier::Enterprise => write!(f, "enterprise"),
        }
    }
}

impl FromStr for SubscriberTier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(SubscriberTier::Free),
            "basic" => Ok(SubscriberTier::Basic),
            "pro" => Ok(SubscriberTier::Pro),
            "enterprise" => Ok(SubscriberTier::Enterprise),
            _ => Err(()),
        }
    }
}

/// 路由方式
///
/// Immediate层级由服务端工作池同步执行；
/// Deferred层级入队等待外部代理端拉取执行。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    /// 服务端同步执行
    Immediate,
    /// 入队延迟执行
    Deferred,
}

impl FromStr for RoutingMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" => Ok(RoutingMode::Immediate),
            "deferred" => Ok(RoutingMode::Deferred),
            _ => Err(()),
        }
    }
}

/// 每订阅者每日用量计数器
///
/// window_start始终为当前UTC日的起点；跨日后计数归零。
/// 懒创建：当日首个被接受的请求时建立。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaCounter {
    /// 订阅者ID
    pub owner_id: Uuid,
    /// 订阅层级
    pub tier: SubscriberTier,
    /// 当日已接受的搜索操作数
    pub search_count: u32,
    /// 当日已接受的详情操作数
    pub detail_count: u32,
    /// 计数窗口起点（UTC日起点）
    pub window_start: DateTime<Utc>,
    /// 最后更新时间
    pub updated_at: DateTime<Utc>,
}

impl QuotaCounter {
    /// 按操作类型取用量
    pub fn count_for(&self, operation: Operation) -> u32 {
        match operation {
            Operation::Search => self.search_count,
            Operation::Details => self.detail_count,
        }
    }
}

/// 计算某时刻所属计数窗口的起点（UTC日起点）
pub fn window_start_for(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// 单个层级的每日限额与路由方式
#[derive(Debug, Clone, Copy)]
pub struct TierLimits {
    /// 每日搜索操作限额
    pub search_daily: u32,
    /// 每日详情操作限额
    pub detail_daily: u32,
    /// 路由方式
    pub routing: RoutingMode,
}

impl TierLimits {
    /// 按操作类型取限额
    pub fn limit_for(&self, operation: Operation) -> u32 {
        match operation {
            Operation::Search => self.search_daily,
            Operation::Details => self.detail_daily,
        }
    }
}

/// 全部层级的限额表
#[derive(Debug, Clone)]
pub struct TierTable {
    pub free: TierLimits,
    pub basic: TierLimits,
    pub pro: TierLimits,
    pub enterprise: TierLimits,
}

impl TierTable {
    /// 查找层级限额
    pub fn limits(&self, tier: SubscriberTier) -> TierLimits {
        match tier {
            SubscriberTier::Free => self.free,
            SubscriberTier::Basic => self.basic,
            SubscriberTier::Pro => self.pro,
            SubscriberTier::Enterprise => self.enterprise,
        }
    }
}

/// 配额用量汇总
#[derive(Debug, Clone, Serialize)]
pub struct QuotaUsage {
    pub owner_id: Uuid,
    pub tier: SubscriberTier,
    pub search_used: u32,
    pub search_limit: u32,
    pub search_remaining: u32,
    pub detail_used: u32,
    pub detail_limit: u32,
    pub detail_remaining: u32,
    /// 计数器下次重置时间（次日UTC零点）
    pub resets_at: DateTime<Utc>,
}

impl QuotaUsage {
    /// 由计数器和限额表构建用量汇总
    ///
    /// 计数器缺失（当日尚无请求）时按零用量处理
    pub fn build(
        owner_id: Uuid,
        tier: SubscriberTier,
        counter: Option<&QuotaCounter>,
        limits: TierLimits,
        now: DateTime<Utc>,
    ) -> Self {
        let window = window_start_for(now);
        // 过期窗口的计数视为已清零
        let (search_used, detail_used) = match counter {
            Some(c) if c.window_start >= window => (c.search_count, c.detail_count),
            _ => (0, 0),
        };

        Self {
            owner_id,
            tier,
            search_used,
            search_limit: limits.search_daily,
            search_remaining: limits.search_daily.saturating_sub(search_used),
            detail_used,
            detail_limit: limits.detail_daily,
            detail_remaining: limits.detail_daily.saturating_sub(detail_used),
            resets_at: window + Duration::days(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_start_is_utc_midnight() {
        let now = Utc::now();
        let start = window_start_for(now);
        assert_eq!(start.time(), NaiveTime::MIN);
        assert_eq!(start.date_naive(), now.date_naive());
    }

    #[test]
    fn test_stale_counter_reads_as_zero_usage() {
        let owner = Uuid::new_v4();
        let now = Utc::now();
        let counter = QuotaCounter {
            owner_id: owner,
            tier: SubscriberTier::Basic,
            search_count: 42,
            detail_count: 7,
            window_start: window_start_for(now) - Duration::days(1),
            updated_at: now,
        };
        let limits = TierLimits {
            search_daily: 100,
            detail_daily: 50,
            routing: RoutingMode::Deferred,
        };

        let usage = QuotaUsage::build(owner, SubscriberTier::Basic, Some(&counter), limits, now);
        assert_eq!(usage.search_used, 0);
        assert_eq!(usage.search_remaining, 100);
        assert_eq!(usage.resets_at, window_start_for(now) + Duration::days(1));
    }
}
