// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::settings::CacheSettings;
use crate::domain::models::job::JobPlatform;
use crate::domain::models::task::Operation;

/// 缓存淘汰策略
///
/// 同一时刻只有一个策略生效，可在运行时切换。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// 淘汰最久未访问的条目
    Lru,
    /// 淘汰访问次数最少的条目
    Lfu,
    /// 淘汰最早创建的条目
    Fifo,
    /// 淘汰最先过期的条目
    Ttl,
}

impl FromStr for EvictionPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lru" => Ok(EvictionPolicy::Lru),
            "lfu" => Ok(EvictionPolicy::Lfu),
            "fifo" => Ok(EvictionPolicy::Fifo),
            "ttl" => Ok(EvictionPolicy::Ttl),
            _ => Err(()),
        }
    }
}

/// 缓存条目
#[derive(Clone)]
struct CacheEntry {
    value: Value,
    created_at: Instant,
    expires_at: Instant,
    last_accessed_at: Instant,
    access_count: u64,
    size_bytes: usize,
}

impl CacheEntry {
    fn new(value: Value, ttl: Duration) -> Self {
        let now = Instant::now();
        let size_bytes = value.to_string().len();
        Self {
            value,
            created_at: now,
            expires_at: now + ttl,
            last_accessed_at: now,
            access_count: 0,
            size_bytes,
        }
    }

    /// 过期条目逻辑上不存在，物理清除交给读取路径或清扫
    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }

    fn touch(&mut self) {
        self.access_count += 1;
        self.last_accessed_at = Instant::now();
    }
}

/// 缓存计数器
#[derive(Debug, Clone, Default)]
struct CacheCounters {
    hits: u64,
    misses: u64,
    evictions: u64,
    stores: u64,
}

/// 缓存统计信息
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub evictions: u64,
    pub stores: u64,
    pub entry_count: usize,
    pub approx_bytes: usize,
    /// 按平台的条目数
    pub by_platform: HashMap<String, u64>,
    /// 按操作类型的条目数
    pub by_operation: HashMap<String, u64>,
    /// 按条目年龄区间的条目数
    pub by_age_bucket: HashMap<String, u64>,
    /// 按条目大小区间的条目数
    pub by_size_bucket: HashMap<String, u64>,
}

/// 结果缓存
///
/// 以 (平台, 操作, 参数) 为键缓存抓取结果。每个进程只构造
/// 一个实例，由Arc句柄共享给所有执行器和API侧调用方，
/// 不存在各执行器私有副本之间的分歧。
pub struct ResultCache {
    entries: DashMap<String, CacheEntry>,
    policy: RwLock<EvictionPolicy>,
    counters: Mutex<CacheCounters>,
    config: CacheSettings,
}

impl ResultCache {
    /// 创建新的结果缓存
    pub fn new(config: CacheSettings) -> Self {
        let policy = EvictionPolicy::from_str(&config.eviction_policy).unwrap_or(EvictionPolicy::Lru);
        Self {
            entries: DashMap::new(),
            policy: RwLock::new(policy),
            counters: Mutex::new(CacheCounters::default()),
            config,
        }
    }

    /// 生成确定性缓存键
    ///
    /// 参数对象的键在序列化前递归排序，相同参数无论
    /// 书写顺序如何都会产生相同的键。键形如
    /// `platform:operation:params`，支持按前缀批量失效。
    pub fn cache_key(platform: JobPlatform, operation: Operation, parameters: &Value) -> String {
        format!(
            "{}:{}:{}",
            platform,
            operation,
            canonical_json(parameters)
        )
    }

    /// 平台（或平台+操作）级失效所用的键前缀
    pub fn key_prefix(platform: JobPlatform, operation: Option<Operation>) -> String {
        match operation {
            Some(op) => format!("{}:{}:", platform, op),
            None => format!("{}:", platform),
        }
    }

    /// 获取缓存值
    ///
    /// 物理存在但已过期的条目按未命中处理并顺带清除
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(key);
                self.counters.lock().misses += 1;
                metrics::counter!("cache_misses_total").increment(1);
                return None;
            }

            entry.touch();
            self.counters.lock().hits += 1;
            metrics::counter!("cache_hits_total").increment(1);
            Some(entry.value.clone())
        } else {
            self.counters.lock().misses += 1;
            metrics::counter!("cache_misses_total").increment(1);
            None
        }
    }

    /// 设置缓存值
    ///
    /// 容量已满且键为新键时，先按当前策略淘汰恰好一个条目
    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(Duration::from_secs(self.config.default_ttl_secs));

        if !self.entries.contains_key(key) && self.entries.len() >= self.config.max_entries {
            self.evict_one();
        }

        self.entries.insert(key.to_string(), CacheEntry::new(value, ttl));
        self.counters.lock().stores += 1;
        debug!("Stored cache entry for key: {}", key);
    }

    /// 删除缓存值
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// 清空缓存
    pub fn clear(&self) {
        self.entries.clear();
        info!("Cleared all cache entries");
    }

    /// 按前缀批量失效
    ///
    /// 用于失效某个平台或某个平台+操作的全部条目
    pub fn invalidate_by_prefix(&self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - self.entries.len();
        info!("Invalidated {} cache entries with prefix '{}'", removed, prefix);
        removed
    }

    /// 切换淘汰策略
    pub fn set_policy(&self, policy: EvictionPolicy) {
        *self.policy.write() = policy;
        info!("Cache eviction policy switched to {:?}", policy);
    }

    /// 当前淘汰策略
    pub fn policy(&self) -> EvictionPolicy {
        *self.policy.read()
    }

    /// 当前条目数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 缓存是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按当前策略淘汰一个条目
    fn evict_one(&self) -> Option<String> {
        let policy = *self.policy.read();

        let victim = self
            .entries
            .iter()
            .min_by(|a, b| match policy {
                EvictionPolicy::Lru => a.value().last_accessed_at.cmp(&b.value().last_accessed_at),
                EvictionPolicy::Lfu => a.value().access_count.cmp(&b.value().access_count),
                EvictionPolicy::Fifo => a.value().created_at.cmp(&b.value().created_at),
                EvictionPolicy::Ttl => a.value().expires_at.cmp(&b.value().expires_at),
            })
            .map(|entry| entry.key().clone())?;

        self.entries.remove(&victim);
        self.counters.lock().evictions += 1;
        metrics::counter!("cache_evictions_total").increment(1);
        debug!("Evicted cache entry: {}", victim);
        Some(victim)
    }

    /// 清扫所有已过期条目，返回清除数量
    pub fn sweep_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before - self.entries.len()
    }

    /// 容量清扫
    ///
    /// 插入路径的逐条淘汰失守时的兜底，淘汰至容量以内
    pub fn sweep_capacity(&self) -> usize {
        let mut evicted = 0;
        while self.entries.len() > self.config.max_entries {
            if self.evict_one().is_none() {
                break;
            }
            evicted += 1;
        }
        evicted
    }

    /// 启动后台清扫任务
    ///
    /// 过期清扫与容量清扫按各自间隔独立运行
    pub fn start_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let cache = Arc::clone(self);

        tokio::spawn(async move {
            let mut expiry_interval =
                tokio::time::interval(Duration::from_secs(cache.config.expiry_sweep_secs));
            let mut capacity_interval =
                tokio::time::interval(Duration::from_secs(cache.config.capacity_sweep_secs));
            // 首个tick立即触发，跳过以免启动时空扫
            expiry_interval.tick().await;
            capacity_interval.tick().await;

            loop {
                tokio::select! {
                    _ = expiry_interval.tick() => {
                        let removed = cache.sweep_expired();
                        if removed > 0 {
                            info!("Expiry sweep removed {} cache entries", removed);
                        }
                    }
                    _ = capacity_interval.tick() => {
                        let evicted = cache.sweep_capacity();
                        if evicted > 0 {
                            info!("Capacity sweep evicted {} cache entries", evicted);
                        }
                    }
                }
            }
        })
    }

    /// 获取缓存统计信息
    pub fn statistics(&self) -> CacheStatistics {
        let counters = self.counters.lock().clone();
        let total = counters.hits + counters.misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            counters.hits as f64 / total as f64
        };

        let mut by_platform: HashMap<String, u64> = HashMap::new();
        let mut by_operation: HashMap<String, u64> = HashMap::new();
        let mut by_age_bucket: HashMap<String, u64> = HashMap::new();
        let mut by_size_bucket: HashMap<String, u64> = HashMap::new();
        let mut approx_bytes = 0usize;

        for entry in self.entries.iter() {
            let mut segments = entry.key().splitn(3, ':');
            let platform = segments.next().unwrap_or("unknown").to_string();
            let operation = segments.next().unwrap_or("unknown").to_string();
            *by_platform.entry(platform).or_insert(0) += 1;
            *by_operation.entry(operation).or_insert(0) += 1;

            let age = entry.value().created_at.elapsed();
            *by_age_bucket.entry(age_bucket(age).to_string()).or_insert(0) += 1;

            let size = entry.value().size_bytes;
            *by_size_bucket
                .entry(size_bucket(size).to_string())
                .or_insert(0) += 1;
            approx_bytes += size;
        }

        CacheStatistics {
            hits: counters.hits,
            misses: counters.misses,
            hit_rate,
            evictions: counters.evictions,
            stores: counters.stores,
            entry_count: self.entries.len(),
            approx_bytes,
            by_platform,
            by_operation,
            by_age_bucket,
            by_size_bucket,
        }
    }
}

/// 参数对象键排序后的规范JSON序列化
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", serde_json::to_string(k).unwrap_or_default(), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", rendered.join(","))
        }
        other => other.to_string(),
    }
}

fn age_bucket(age: Duration) -> &'static str {
    if age < Duration::from_secs(60) {
        "<1m"
    } else if age < Duration::from_secs(600) {
        "1m-10m"
    } else if age < Duration::from_secs(3600) {
        "10m-1h"
    } else {
        ">=1h"
    }
}

fn size_bucket(size: usize) -> &'static str {
    if size < 1024 {
        "<1KB"
    } else if size < 16 * 1024 {
        "1KB-16KB"
    } else if size < 256 * 1024 {
        "16KB-256KB"
    } else {
        ">=256KB"
    }
}
