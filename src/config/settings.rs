// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// 应用程序配置设置
///
/// 包含数据库、代理池、缓存、队列、工作器和配额等所有配置项
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// 数据库配置
    pub database: DatabaseSettings,
    /// 指标导出配置
    pub metrics: MetricsSettings,
    /// 代理池配置
    pub proxy: ProxyPoolSettings,
    /// 结果缓存配置
    pub cache: CacheSettings,
    /// 任务队列配置
    pub queue: QueueSettings,
    /// 工作器池配置
    pub workers: WorkerSettings,
    /// 配额层级配置
    pub quota: QuotaSettings,
    /// 站点适配器配置
    pub adapters: AdapterSettings,
}

/// 数据库配置设置
#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    /// 数据库连接URL
    pub url: String,
    /// 最大连接数
    pub max_connections: Option<u32>,
    /// 最小连接数
    pub min_connections: Option<u32>,
    /// 连接超时时间（秒）
    pub connect_timeout: Option<u64>,
    /// 空闲连接超时时间（秒）
    pub idle_timeout: Option<u64>,
}

/// 指标导出配置设置
#[derive(Debug, Deserialize)]
pub struct MetricsSettings {
    /// 是否启用Prometheus导出
    pub enabled: bool,
    /// 监听地址
    pub listen_addr: String,
}

/// 代理池配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyPoolSettings {
    /// 提供商同步间隔（秒）
    pub refresh_interval_secs: u64,
    /// 健康检查间隔（秒）
    pub health_check_interval_secs: u64,
    /// 每轮健康检查的批次大小
    pub health_batch_size: usize,
    /// 健康探测目标URL
    pub probe_url: String,
    /// 探测超时时间（秒）
    pub probe_timeout_secs: u64,
    /// 封禁阈值，ban_count达到该值后不再可选
    pub ban_threshold: u32,
    /// 选择冷却时间（秒），刚用过的代理在此窗口内跳过
    pub cooldown_secs: i64,
    /// 加权选择中成功率的权重
    pub success_weight: f64,
    /// 加权选择中延迟的权重
    pub latency_weight: f64,
    /// 候选数超过该值时改用加权随机选择
    pub weighted_threshold: usize,
    /// 延迟归一化上限（毫秒）
    pub latency_cap_ms: f64,
    /// 响应时间EMA平滑系数
    pub ema_alpha: f64,
    /// 代理提供商列表
    #[serde(default)]
    pub providers: Vec<ProviderSettings>,
}

/// 单个代理提供商配置
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    /// 提供商标识
    pub name: String,
    /// HTTP API端点（JSON列表），与endpoints二选一
    pub api_url: Option<String>,
    /// API基本认证用户名
    pub api_username: Option<String>,
    /// API基本认证密码
    pub api_password: Option<String>,
    /// 静态端点列表
    #[serde(default)]
    pub endpoints: Vec<StaticEndpointSettings>,
}

/// 静态配置的代理端点
#[derive(Debug, Clone, Deserialize)]
pub struct StaticEndpointSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// 传输协议 (http, https, socks5)
    pub protocol: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    #[serde(default)]
    pub residential: bool,
}

/// 结果缓存配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// 默认TTL（秒）
    pub default_ttl_secs: u64,
    /// 最大缓存条目数
    pub max_entries: usize,
    /// 淘汰策略 (lru, lfu, fifo, ttl)
    pub eviction_policy: String,
    /// 过期条目清扫间隔（秒）
    pub expiry_sweep_secs: u64,
    /// 容量清扫间隔（秒）
    pub capacity_sweep_secs: u64,
}

/// 任务队列配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    /// 终态任务保留天数
    pub retention_days: i64,
    /// 任务租约时长（秒）
    pub lease_secs: i64,
    /// 维护调度间隔（秒）
    pub maintenance_interval_secs: u64,
}

/// 工作器池配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    /// 最小执行器数量
    pub min_workers: usize,
    /// 最大执行器数量
    pub max_workers: usize,
    /// 空闲时的队列轮询间隔（秒）
    pub poll_interval_secs: u64,
    /// 心跳上报间隔（秒）
    pub heartbeat_interval_secs: u64,
    /// 吞吐量上报间隔（秒）
    pub throughput_interval_secs: u64,
    /// 心跳超时（秒），超过后强制替换执行器
    pub liveness_timeout_secs: i64,
    /// 自动伸缩采样间隔（秒）
    pub autoscale_interval_secs: u64,
    /// 高水位负载阈值
    pub high_water_mark: f64,
    /// 低水位负载阈值
    pub low_water_mark: f64,
    /// 优雅下线宽限期（秒）
    pub drain_grace_secs: u64,
}

/// 配额层级配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaSettings {
    pub free: TierSettings,
    pub basic: TierSettings,
    pub pro: TierSettings,
    pub enterprise: TierSettings,
}

/// 单个订阅层级的每日限额与路由方式
#[derive(Debug, Clone, Deserialize)]
pub struct TierSettings {
    /// 每日搜索操作限额
    pub search_daily: u32,
    /// 每日详情操作限额
    pub detail_daily: u32,
    /// 路由方式 (immediate, deferred)
    pub routing: String,
}

/// 站点适配器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterSettings {
    /// 适配器请求超时时间（秒）
    pub request_timeout_secs: u64,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 从环境变量加载配置，支持默认值
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Config::builder()
            // Default DB pool settings
            .set_default("database.max_connections", 100)?
            .set_default("database.min_connections", 10)?
            .set_default("database.connect_timeout", 10)?
            .set_default("database.idle_timeout", 300)?
            // Default metrics settings
            .set_default("metrics.enabled", true)?
            .set_default("metrics.listen_addr", "0.0.0.0:9000")?
            // Default proxy pool settings
            .set_default("proxy.refresh_interval_secs", 3600)?
            .set_default("proxy.health_check_interval_secs", 1800)?
            .set_default("proxy.health_batch_size", 10)?
            .set_default("proxy.probe_url", "https://api.ipify.org?format=json")?
            .set_default("proxy.probe_timeout_secs", 10)?
            .set_default("proxy.ban_threshold", 5)?
            .set_default("proxy.cooldown_secs", 30)?
            .set_default("proxy.success_weight", 0.7)?
            .set_default("proxy.latency_weight", 0.3)?
            .set_default("proxy.weighted_threshold", 10)?
            .set_default("proxy.latency_cap_ms", 5000.0)?
            .set_default("proxy.ema_alpha", 0.3)?
            // Default cache settings
            .set_default("cache.default_ttl_secs", 1800)?
            .set_default("cache.max_entries", 5000)?
            .set_default("cache.eviction_policy", "lru")?
            .set_default("cache.expiry_sweep_secs", 300)?
            .set_default("cache.capacity_sweep_secs", 600)?
            // Default queue settings
            .set_default("queue.retention_days", 7)?
            .set_default("queue.lease_secs", 300)?
            .set_default("queue.maintenance_interval_secs", 60)?
            // Default worker settings
            .set_default("workers.min_workers", 1)?
            .set_default("workers.max_workers", 8)?
            .set_default("workers.poll_interval_secs", 1)?
            .set_default("workers.heartbeat_interval_secs", 30)?
            .set_default("workers.throughput_interval_secs", 60)?
            .set_default("workers.liveness_timeout_secs", 120)?
            .set_default("workers.autoscale_interval_secs", 30)?
            .set_default("workers.high_water_mark", 0.75)?
            .set_default("workers.low_water_mark", 0.25)?
            .set_default("workers.drain_grace_secs", 30)?
            // Default quota tiers
            .set_default("quota.free.search_daily", 25)?
            .set_default("quota.free.detail_daily", 10)?
            .set_default("quota.free.routing", "deferred")?
            .set_default("quota.basic.search_daily", 100)?
            .set_default("quota.basic.detail_daily", 50)?
            .set_default("quota.basic.routing", "deferred")?
            .set_default("quota.pro.search_daily", 500)?
            .set_default("quota.pro.detail_daily", 250)?
            .set_default("quota.pro.routing", "immediate")?
            .set_default("quota.enterprise.search_daily", 2000)?
            .set_default("quota.enterprise.detail_daily", 1000)?
            .set_default("quota.enterprise.routing", "immediate")?
            // Default adapter settings
            .set_default("adapters.request_timeout_secs", 30)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("HARVESTRS").separator("__"));

        builder.build()?.try_deserialize()
    }
}
