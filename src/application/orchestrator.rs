// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

use crate::adapters::identity::IdentityRotator;
use crate::adapters::traits::{AdapterError, AdapterRouter, FetchContext};
use crate::domain::models::job::{DetailsParams, JobPlatform, SearchParams};
use crate::domain::models::proxy::SelectionCriteria;
use crate::domain::models::task::{Operation, ScrapeTask};
use crate::infrastructure::cache::result_cache::ResultCache;
use crate::infrastructure::geolocation::LocationResolver;
use crate::infrastructure::proxy::pool::ProxyPoolManager;
use crate::utils::errors::ScrapeError;

/// 任务执行器特质
///
/// 工作器池通过该接口执行已认领的任务
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// 执行一个任务并返回结果值
    async fn execute(&self, task: &ScrapeTask) -> Result<Value, ScrapeError>;
}

/// 抓取会话编排器
///
/// 单次抓取请求的粘合层：缓存查找 → 代理获取 → 委派站点
/// 适配器 → 结果回报 → 缓存写入。命中缓存时完全不触碰
/// 代理池；失败结果从不写入缓存。立即路由的请求与队列
/// 执行器走的是同一条路径。
pub struct ScrapeOrchestrator {
    cache: Arc<ResultCache>,
    pool: Arc<ProxyPoolManager>,
    router: Arc<dyn AdapterRouter>,
    identities: Arc<IdentityRotator>,
}

impl ScrapeOrchestrator {
    /// 创建新的编排器实例
    pub fn new(
        cache: Arc<ResultCache>,
        pool: Arc<ProxyPoolManager>,
        router: Arc<dyn AdapterRouter>,
        identities: Arc<IdentityRotator>,
    ) -> Self {
        Self {
            cache,
            pool,
            router,
            identities,
        }
    }

    /// 执行职位搜索
    pub async fn search(
        &self,
        platform: JobPlatform,
        params: &SearchParams,
    ) -> Result<Value, ScrapeError> {
        let parameters = serde_json::to_value(params)
            .map_err(|e| ScrapeError::Internal(format!("parameter serialization: {}", e)))?;
        self.execute_operation(platform, Operation::Search, &parameters)
            .await
    }

    /// 执行职位详情抓取
    pub async fn details(
        &self,
        platform: JobPlatform,
        params: &DetailsParams,
    ) -> Result<Value, ScrapeError> {
        let parameters = serde_json::to_value(params)
            .map_err(|e| ScrapeError::Internal(format!("parameter serialization: {}", e)))?;
        self.execute_operation(platform, Operation::Details, &parameters)
            .await
    }

    /// 执行一次抓取操作
    #[instrument(skip(self, parameters), fields(platform = %platform, operation = %operation))]
    async fn execute_operation(
        &self,
        platform: JobPlatform,
        operation: Operation,
        parameters: &Value,
    ) -> Result<Value, ScrapeError> {
        let key = ResultCache::cache_key(platform, operation, parameters);
        if let Some(cached) = self.cache.get(&key) {
            debug!("Cache hit, skipping proxy pool");
            return Ok(cached);
        }

        let criteria = self.selection_criteria(platform, parameters);
        let proxy = self
            .pool
            .select(&criteria)
            .map_err(|_| ScrapeError::NoProxyAvailable)?;
        let identity = self.identities.rotate(platform);
        let ctx = FetchContext {
            proxy: proxy.clone(),
            identity,
        };

        let started = Instant::now();
        let outcome = match operation {
            Operation::Search => {
                let params: SearchParams = serde_json::from_value(parameters.clone())
                    .map_err(|e| ScrapeError::Validation(e.to_string()))?;
                self.router
                    .search(platform, &params, &ctx)
                    .await
                    .and_then(|postings| {
                        serde_json::to_value(postings)
                            .map_err(|e| AdapterError::Extraction(e.to_string()))
                    })
            }
            Operation::Details => {
                let params: DetailsParams = serde_json::from_value(parameters.clone())
                    .map_err(|e| ScrapeError::Validation(e.to_string()))?;
                self.router
                    .details(platform, &params, &ctx)
                    .await
                    .and_then(|details| {
                        serde_json::to_value(details)
                            .map_err(|e| AdapterError::Extraction(e.to_string()))
                    })
            }
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(value) => {
                self.pool.report_success(&proxy.key, elapsed_ms);
                self.cache.set(&key, value.clone(), None);
                metrics::counter!("scrape_success_total", "platform" => platform.to_string())
                    .increment(1);
                metrics::histogram!("scrape_duration_ms").record(elapsed_ms);
                Ok(value)
            }
            Err(e) => {
                let banned = e.is_blocked();
                self.pool.report_failure(&proxy.key, banned);
                metrics::counter!(
                    "scrape_failures_total",
                    "platform" => platform.to_string(),
                    "blocked" => banned.to_string()
                )
                .increment(1);
                warn!("Scrape via {} failed: {}", proxy.key, e);
                Err(match e {
                    AdapterError::Blocked { .. } => ScrapeError::BlockedByTarget,
                    AdapterError::Transport(msg) => ScrapeError::TransportFailure(msg),
                    AdapterError::Extraction(msg) => ScrapeError::ExtractionFailure(msg),
                })
            }
        }
    }

    /// 从搜索参数中的自由文本地点推导代理选择条件
    ///
    /// 尽力而为：无法解析时返回空条件，选择流程自行降级
    fn selection_criteria(&self, platform: JobPlatform, parameters: &Value) -> SelectionCriteria {
        let hint = parameters
            .get("location")
            .and_then(|v| v.as_str())
            .and_then(LocationResolver::resolve);

        match hint {
            Some(hint) => SelectionCriteria {
                country: hint.country,
                region: hint.region,
                platform_hint: Some(platform),
                ..Default::default()
            },
            None => SelectionCriteria {
                platform_hint: Some(platform),
                ..Default::default()
            },
        }
    }
}

#[async_trait]
impl TaskExecutor for ScrapeOrchestrator {
    async fn execute(&self, task: &ScrapeTask) -> Result<Value, ScrapeError> {
        self.execute_operation(task.platform, task.operation, &task.parameters)
            .await
    }
}
