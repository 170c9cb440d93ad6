// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::settings::ProxyPoolSettings;
use crate::domain::models::proxy::{ProxyKey, ProxyRecord, SelectionCriteria};
use crate::infrastructure::proxy::provider::ProxyProvider;

/// 代理池错误类型
#[derive(Error, Debug)]
pub enum PoolError {
    /// 整个池耗尽或全部被封禁
    #[error("No proxy available")]
    NoProxyAvailable,
}

/// 代理池统计信息
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatistics {
    pub total: usize,
    pub banned: usize,
    pub selectable: usize,
    pub total_success: u64,
    pub total_failure: u64,
    pub total_bans: u64,
    pub avg_response_time_ms: Option<f64>,
    pub by_provider: HashMap<String, u64>,
    pub by_country: HashMap<String, u64>,
}

/// 代理池管理器
///
/// 维护出口端点清单并按历史表现选择端点。每个进程只构造
/// 一个实例，所有执行器通过Arc句柄共享，端点评分不会在
/// 执行器之间产生分歧。回报接口可被多个执行器并发调用。
pub struct ProxyPoolManager {
    proxies: DashMap<ProxyKey, ProxyRecord>,
    providers: Vec<Arc<dyn ProxyProvider>>,
    config: ProxyPoolSettings,
}

impl ProxyPoolManager {
    /// 创建新的代理池管理器
    pub fn new(providers: Vec<Arc<dyn ProxyProvider>>, config: ProxyPoolSettings) -> Self {
        Self {
            proxies: DashMap::new(),
            providers,
            config,
        }
    }

    /// 从所有提供商同步端点
    ///
    /// 按 (提供商, 主机, 端口) 合并，已有端点保留历史计数，
    /// 仅刷新凭据与地理属性。单个提供商失败不影响其它提供商。
    /// 已下线提供商的端点在此一并移除。
    pub async fn refresh(&self) {
        let configured: Vec<String> = self.providers.iter().map(|p| p.name().to_string()).collect();
        let before = self.proxies.len();
        self.proxies
            .retain(|key, _| configured.iter().any(|name| name == &key.provider));
        let pruned = before - self.proxies.len();
        if pruned > 0 {
            info!("Pruned {} endpoints from removed providers", pruned);
        }

        // 各提供商并行拉取，互不阻塞
        let fetches = self.providers.iter().map(|provider| async move {
            (provider.name().to_string(), provider.fetch().await)
        });
        for (name, outcome) in futures::future::join_all(fetches).await {
            match outcome {
                Ok(records) => {
                    let count = records.len();
                    for record in records {
                        self.upsert(record);
                    }
                    info!("Provider '{}' synced {} endpoints", name, count);
                }
                Err(e) => {
                    error!("Provider '{}' sync failed: {}", name, e);
                }
            }
        }

        metrics::gauge!("proxy_pool_size").set(self.proxies.len() as f64);
    }

    /// 合并单个端点，保留已有记录的计数
    pub fn upsert(&self, record: ProxyRecord) {
        self.proxies
            .entry(record.key.clone())
            .and_modify(|existing| {
                existing.credentials = record.credentials.clone();
                existing.transport = record.transport;
                existing.geo = record.geo.clone();
                existing.residential = record.residential;
            })
            .or_insert(record);
    }

    /// 按条件选择一个端点
    ///
    /// 选择流水线：条件过滤 → 剔除封禁 → 剔除冷却期内端点 →
    /// 过滤结果为空时退回全池（仅剔除封禁）。候选数超过阈值时
    /// 按 成功率×权重 + 归一化延迟×权重 做加权随机，否则取
    /// 成功率最高者（延迟低者优先破平）。选中即更新last_used_at。
    pub fn select(&self, criteria: &SelectionCriteria) -> Result<ProxyRecord, PoolError> {
        let now = Utc::now();
        let cooldown = ChronoDuration::seconds(self.config.cooldown_secs);

        let not_banned: Vec<ProxyRecord> = self
            .proxies
            .iter()
            .filter(|entry| !entry.value().is_banned(self.config.ban_threshold))
            .map(|entry| entry.value().clone())
            .collect();

        if not_banned.is_empty() {
            warn!("Proxy pool exhausted: every endpoint is banned or absent");
            return Err(PoolError::NoProxyAvailable);
        }

        let mut candidates: Vec<ProxyRecord> = not_banned
            .iter()
            .filter(|record| Self::matches_criteria(record, criteria))
            .filter(|record| match record.last_used_at {
                Some(used_at) => now - used_at >= cooldown,
                None => true,
            })
            .cloned()
            .collect();

        if candidates.is_empty() {
            // 条件或冷却过滤吃光了候选，降级到全池（仅剔除封禁）
            debug!("Criteria matched no proxy, degrading to full pool");
            candidates = not_banned;
        }

        let chosen = if candidates.len() > self.config.weighted_threshold {
            self.weighted_pick(&candidates)
        } else {
            Self::deterministic_pick(&candidates)
        };

        let mut record = chosen.ok_or(PoolError::NoProxyAvailable)?;

        if let Some(mut entry) = self.proxies.get_mut(&record.key) {
            entry.last_used_at = Some(now);
            record = entry.clone();
        }
        metrics::counter!("proxy_selections_total").increment(1);

        Ok(record)
    }

    fn matches_criteria(record: &ProxyRecord, criteria: &SelectionCriteria) -> bool {
        if let Some(country) = &criteria.country {
            if record.geo.country.as_deref() != Some(country.as_str()) {
                return false;
            }
        }
        if let Some(city) = &criteria.city {
            if record.geo.city.as_deref() != Some(city.as_str()) {
                return false;
            }
        }
        if let Some(region) = &criteria.region {
            if record.geo.region.as_deref() != Some(region.as_str()) {
                return false;
            }
        }
        if criteria.residential_only && !record.residential {
            return false;
        }
        if let Some(provider) = &criteria.provider {
            if &record.key.provider != provider {
                return false;
            }
        }
        if criteria.exclude.contains(&record.key) {
            return false;
        }
        if let Some(min_rate) = criteria.min_success_rate {
            if record.success_rate() < min_rate {
                return false;
            }
        }
        true
    }

    /// 候选端点的综合评分
    ///
    /// 延迟归一化到 [0,1]（越低越好），未知延迟按中性0.5计
    fn score(&self, record: &ProxyRecord) -> f64 {
        let latency_score = match record.response_time_ema {
            Some(ema) => 1.0 - (ema.min(self.config.latency_cap_ms) / self.config.latency_cap_ms),
            None => 0.5,
        };
        self.config.success_weight * record.success_rate()
            + self.config.latency_weight * latency_score
    }

    fn weighted_pick(&self, candidates: &[ProxyRecord]) -> Option<ProxyRecord> {
        let weights: Vec<f64> = candidates.iter().map(|r| self.score(r)).collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return candidates.first().cloned();
        }

        let mut rng = rand::rng();
        let mut roll = rng.random_range(0.0..total);
        for (record, weight) in candidates.iter().zip(weights.iter()) {
            if roll < *weight {
                return Some(record.clone());
            }
            roll -= weight;
        }
        candidates.last().cloned()
    }

    fn deterministic_pick(candidates: &[ProxyRecord]) -> Option<ProxyRecord> {
        candidates
            .iter()
            .max_by(|a, b| {
                a.success_rate()
                    .partial_cmp(&b.success_rate())
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        // 成功率持平时延迟低者胜出
                        let a_ema = a.response_time_ema.unwrap_or(f64::MAX);
                        let b_ema = b.response_time_ema.unwrap_or(f64::MAX);
                        b_ema.partial_cmp(&a_ema).unwrap_or(std::cmp::Ordering::Equal)
                    })
            })
            .cloned()
    }

    /// 回报一次成功，可并发调用
    pub fn report_success(&self, key: &ProxyKey, response_time_ms: f64) {
        if let Some(mut entry) = self.proxies.get_mut(key) {
            entry.record_success(response_time_ms, self.config.ema_alpha);
        }
        metrics::counter!("proxy_success_total").increment(1);
    }

    /// 回报一次失败，可并发调用
    ///
    /// # 参数
    ///
    /// * `banned` - 是否为封禁信号
    pub fn report_failure(&self, key: &ProxyKey, banned: bool) {
        if let Some(mut entry) = self.proxies.get_mut(key) {
            entry.record_failure(banned);
            if banned {
                warn!(
                    "Proxy {} flagged as banned ({} strikes)",
                    key, entry.ban_count
                );
            }
        }
        metrics::counter!("proxy_failures_total", "banned" => banned.to_string()).increment(1);
    }

    /// 当前池内全部端点快照
    pub fn all_records(&self) -> Vec<ProxyRecord> {
        self.proxies.iter().map(|e| e.value().clone()).collect()
    }

    /// 按身份键查找端点
    pub fn find(&self, key: &ProxyKey) -> Option<ProxyRecord> {
        self.proxies.get(key).map(|e| e.value().clone())
    }

    /// 池内端点数量
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    /// 池是否为空
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// 汇总统计信息（管理接口）
    pub fn statistics(&self) -> PoolStatistics {
        let mut stats = PoolStatistics {
            total: 0,
            banned: 0,
            selectable: 0,
            total_success: 0,
            total_failure: 0,
            total_bans: 0,
            avg_response_time_ms: None,
            by_provider: HashMap::new(),
            by_country: HashMap::new(),
        };

        let mut ema_sum = 0.0;
        let mut ema_count = 0usize;

        for entry in self.proxies.iter() {
            let record = entry.value();
            stats.total += 1;
            if record.is_banned(self.config.ban_threshold) {
                stats.banned += 1;
            } else {
                stats.selectable += 1;
            }
            stats.total_success += record.success_count;
            stats.total_failure += record.failure_count;
            stats.total_bans += record.ban_count as u64;
            *stats
                .by_provider
                .entry(record.key.provider.clone())
                .or_insert(0) += 1;
            if let Some(country) = &record.geo.country {
                *stats.by_country.entry(country.clone()).or_insert(0) += 1;
            }
            if let Some(ema) = record.response_time_ema {
                ema_sum += ema;
                ema_count += 1;
            }
        }

        if ema_count > 0 {
            stats.avg_response_time_ms = Some(ema_sum / ema_count as f64);
        }

        stats
    }

    /// 启动定期提供商同步任务
    pub fn start_refresh_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let pool = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(pool.config.refresh_interval_secs));
            // 启动时refresh已单独执行过一次
            interval.tick().await;

            loop {
                interval.tick().await;
                pool.refresh().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::proxy::{ProxyGeo, ProxyTransport};

    fn settings() -> ProxyPoolSettings {
        ProxyPoolSettings {
            refresh_interval_secs: 3600,
            health_check_interval_secs: 1800,
            health_batch_size: 10,
            probe_url: "http://probe.invalid/ip".into(),
            probe_timeout_secs: 5,
            ban_threshold: 5,
            cooldown_secs: 30,
            success_weight: 0.7,
            latency_weight: 0.3,
            weighted_threshold: 10,
            latency_cap_ms: 5000.0,
            ema_alpha: 0.3,
            providers: vec![],
        }
    }

    fn record(host: &str, country: Option<&str>) -> ProxyRecord {
        ProxyRecord::new(
            ProxyKey {
                provider: "acme".into(),
                host: host.into(),
                port: 8080,
            },
            None,
            ProxyTransport::Http,
            ProxyGeo {
                country: country.map(|c| c.to_string()),
                city: None,
                region: None,
            },
            false,
        )
    }

    fn pool_with(records: Vec<ProxyRecord>) -> ProxyPoolManager {
        let pool = ProxyPoolManager::new(vec![], settings());
        for r in records {
            pool.upsert(r);
        }
        pool
    }

    #[test]
    fn test_banned_proxy_is_never_selected() {
        let mut banned = record("10.0.0.1", None);
        for _ in 0..5 {
            banned.record_failure(true);
        }
        let healthy = record("10.0.0.2", None);
        let pool = pool_with(vec![banned.clone(), healthy.clone()]);

        for _ in 0..20 {
            let chosen = pool.select(&SelectionCriteria::default()).unwrap();
            assert_eq!(chosen.key, healthy.key);
        }
    }

    #[test]
    fn test_fully_banned_pool_fails() {
        let mut banned = record("10.0.0.1", None);
        for _ in 0..5 {
            banned.record_failure(true);
        }
        let pool = pool_with(vec![banned]);

        assert!(matches!(
            pool.select(&SelectionCriteria::default()),
            Err(PoolError::NoProxyAvailable)
        ));
    }

    #[test]
    fn test_empty_pool_fails() {
        let pool = pool_with(vec![]);
        assert!(pool.select(&SelectionCriteria::default()).is_err());
    }

    #[test]
    fn test_recently_used_proxy_is_skipped_when_alternative_exists() {
        let pool = pool_with(vec![record("10.0.0.1", None), record("10.0.0.2", None)]);

        let first = pool.select(&SelectionCriteria::default()).unwrap();
        let second = pool.select(&SelectionCriteria::default()).unwrap();
        assert_ne!(first.key, second.key);
    }

    #[test]
    fn test_cooldown_degrades_to_full_pool_when_no_alternative() {
        let pool = pool_with(vec![record("10.0.0.1", None)]);

        let first = pool.select(&SelectionCriteria::default()).unwrap();
        // 唯一的端点仍在冷却期内，但降级路径必须返回它而不是失败
        let second = pool.select(&SelectionCriteria::default()).unwrap();
        assert_eq!(first.key, second.key);
    }

    #[test]
    fn test_geo_filter_prefers_matching_country() {
        let pool = pool_with(vec![
            record("10.0.0.1", Some("US")),
            record("10.0.0.2", Some("DE")),
        ]);

        let criteria = SelectionCriteria {
            country: Some("DE".into()),
            ..Default::default()
        };
        let chosen = pool.select(&criteria).unwrap();
        assert_eq!(chosen.geo.country.as_deref(), Some("DE"));
    }

    #[test]
    fn test_unmatchable_criteria_degrades_instead_of_failing() {
        let pool = pool_with(vec![record("10.0.0.1", Some("US"))]);

        let criteria = SelectionCriteria {
            country: Some("JP".into()),
            ..Default::default()
        };
        // 无JP端点，但select降级到全池而不是报错
        assert!(pool.select(&criteria).is_ok());
    }

    #[test]
    fn test_deterministic_pick_prefers_success_rate_then_latency() {
        let mut strong = record("10.0.0.1", None);
        strong.record_success(100.0, 0.3);
        strong.record_success(100.0, 0.3);

        let mut weak = record("10.0.0.2", None);
        weak.record_success(50.0, 0.3);
        weak.record_failure(false);

        let chosen = ProxyPoolManager::deterministic_pick(&[strong.clone(), weak]).unwrap();
        assert_eq!(chosen.key, strong.key);

        // 成功率持平时，延迟低者胜出
        let mut fast = record("10.0.0.3", None);
        fast.record_success(10.0, 0.3);
        let mut slow = record("10.0.0.4", None);
        slow.record_success(900.0, 0.3);
        let chosen = ProxyPoolManager::deterministic_pick(&[slow, fast.clone()]).unwrap();
        assert_eq!(chosen.key, fast.key);
    }

    #[test]
    fn test_weighted_pick_kicks_in_above_threshold() {
        let records: Vec<ProxyRecord> = (0..12)
            .map(|i| record(&format!("10.0.1.{}", i), None))
            .collect();
        let pool = pool_with(records.clone());

        // 候选超过阈值时走加权随机，返回值必须来自候选集合
        let chosen = pool.select(&SelectionCriteria::default()).unwrap();
        assert!(records.iter().any(|r| r.key == chosen.key));
    }

    #[test]
    fn test_upsert_preserves_counters_on_refresh() {
        let pool = pool_with(vec![record("10.0.0.1", Some("US"))]);
        pool.report_success(
            &ProxyKey {
                provider: "acme".into(),
                host: "10.0.0.1".into(),
                port: 8080,
            },
            120.0,
        );

        // 提供商刷新送来同一端点的新鲜副本
        pool.upsert(record("10.0.0.1", Some("CA")));

        let refreshed = pool
            .find(&ProxyKey {
                provider: "acme".into(),
                host: "10.0.0.1".into(),
                port: 8080,
            })
            .unwrap();
        assert_eq!(refreshed.success_count, 1);
        assert_eq!(refreshed.geo.country.as_deref(), Some("CA"));
    }

    #[test]
    fn test_exclusion_list_is_honored() {
        let excluded = record("10.0.0.1", None);
        let other = record("10.0.0.2", None);
        let pool = pool_with(vec![excluded.clone(), other.clone()]);

        let criteria = SelectionCriteria {
            exclude: vec![excluded.key.clone()],
            ..Default::default()
        };
        let chosen = pool.select(&criteria).unwrap();
        assert_eq!(chosen.key, other.key);
    }

    #[test]
    fn test_statistics_counts_banned() {
        let mut banned = record("10.0.0.1", Some("US"));
        for _ in 0..5 {
            banned.record_failure(true);
        }
        let pool = pool_with(vec![banned, record("10.0.0.2", Some("US"))]);

        let stats = pool.statistics();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.banned, 1);
        assert_eq!(stats.selectable, 1);
        assert_eq!(stats.by_country.get("US"), Some(&2));
    }
}
