// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::application::dto::requests::{DetailsRequestDto, SearchRequestDto};
use crate::application::orchestrator::ScrapeOrchestrator;
use crate::application::quota_gate::QuotaGate;
use crate::domain::models::job::JobPlatform;
use crate::domain::models::quota::{QuotaUsage, RoutingMode, SubscriberTier};
use crate::domain::models::task::{Operation, ScrapeTask};
use crate::domain::repositories::task_repository::TaskStatistics;
use crate::infrastructure::cache::result_cache::{CacheStatistics, EvictionPolicy, ResultCache};
use crate::infrastructure::proxy::pool::{PoolStatistics, ProxyPoolManager};
use crate::queue::task_queue::{QueueError, TaskQueue};
use crate::utils::errors::ScrapeError;

/// 搜索请求的处理结果
///
/// 立即路由返回结果本身；延迟路由返回任务ID，
/// 由外部代理端轮询执行
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestOutcome {
    /// 服务端已同步执行，附带结果
    Completed { result: serde_json::Value },
    /// 已入队延迟执行
    Deferred { task_id: Uuid },
}

/// 聚合服务门面
///
/// 核心对外暴露的全部入口：search、job_details、task_status、
/// usage，以及缓存/代理池的管理操作。HTTP层（外部协作方）
/// 只与该门面交互。
pub struct AggregationService<Q: TaskQueue> {
    gate: Arc<QuotaGate>,
    orchestrator: Arc<ScrapeOrchestrator>,
    queue: Arc<Q>,
    cache: Arc<ResultCache>,
    pool: Arc<ProxyPoolManager>,
}

impl<Q: TaskQueue> AggregationService<Q> {
    /// 创建新的聚合服务实例
    pub fn new(
        gate: Arc<QuotaGate>,
        orchestrator: Arc<ScrapeOrchestrator>,
        queue: Arc<Q>,
        cache: Arc<ResultCache>,
        pool: Arc<ProxyPoolManager>,
    ) -> Self {
        Self {
            gate,
            orchestrator,
            queue,
            cache,
            pool,
        }
    }

    /// 职位搜索入口
    pub async fn search(
        &self,
        owner_id: Uuid,
        tier: SubscriberTier,
        platform: JobPlatform,
        request: SearchRequestDto,
    ) -> Result<RequestOutcome, ScrapeError> {
        request
            .validate()
            .map_err(|e| ScrapeError::Validation(e.to_string()))?;

        let routing = self
            .gate
            .route_and_accept(owner_id, tier, Operation::Search)
            .await?;
        let params = request.into_params();

        match routing {
            RoutingMode::Immediate => {
                let result = self.orchestrator.search(platform, &params).await?;
                Ok(RequestOutcome::Completed { result })
            }
            RoutingMode::Deferred => {
                let parameters = serde_json::to_value(&params)
                    .map_err(|e| ScrapeError::Internal(e.to_string()))?;
                let task = ScrapeTask::new_search(owner_id, platform, parameters);
                let enqueued = self.queue.enqueue(task).await?;
                info!("Search deferred as task {}", enqueued.id);
                Ok(RequestOutcome::Deferred {
                    task_id: enqueued.id,
                })
            }
        }
    }

    /// 职位详情入口
    pub async fn job_details(
        &self,
        owner_id: Uuid,
        tier: SubscriberTier,
        platform: JobPlatform,
        request: DetailsRequestDto,
    ) -> Result<RequestOutcome, ScrapeError> {
        request
            .validate()
            .map_err(|e| ScrapeError::Validation(e.to_string()))?;

        let routing = self
            .gate
            .route_and_accept(owner_id, tier, Operation::Details)
            .await?;
        let params = request.into_params();

        match routing {
            RoutingMode::Immediate => {
                let result = self.orchestrator.details(platform, &params).await?;
                Ok(RequestOutcome::Completed { result })
            }
            RoutingMode::Deferred => {
                let parameters = serde_json::to_value(&params)
                    .map_err(|e| ScrapeError::Internal(e.to_string()))?;
                let task =
                    ScrapeTask::new_details(owner_id, platform, &params.subject_id, parameters);
                let enqueued = self.queue.enqueue(task).await?;
                info!("Details deferred as task {}", enqueued.id);
                Ok(RequestOutcome::Deferred {
                    task_id: enqueued.id,
                })
            }
        }
    }

    /// 任务状态查询
    ///
    /// 任务必须属于请求方，否则返回Unauthorized
    pub async fn task_status(
        &self,
        owner_id: Uuid,
        task_id: Uuid,
    ) -> Result<ScrapeTask, ScrapeError> {
        let task = self
            .queue
            .status(task_id)
            .await?
            .ok_or(ScrapeError::TaskNotFound)?;

        if task.owner_id != owner_id {
            return Err(ScrapeError::Unauthorized);
        }
        Ok(task)
    }

    /// 配额用量查询
    pub async fn usage(
        &self,
        owner_id: Uuid,
        tier: SubscriberTier,
    ) -> Result<QuotaUsage, ScrapeError> {
        self.gate.usage(owner_id, tier).await
    }

    /// 按订阅者汇总任务统计
    pub async fn task_statistics(&self, owner_id: Uuid) -> Result<TaskStatistics, ScrapeError> {
        let stats = self.queue.statistics_for(owner_id).await?;
        Ok(stats)
    }

    /// 清空结果缓存（管理操作）
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// 切换缓存淘汰策略（管理操作）
    pub fn set_eviction_policy(&self, policy: EvictionPolicy) {
        self.cache.set_policy(policy);
    }

    /// 失效某平台（或平台+操作）的全部缓存条目（管理操作）
    pub fn invalidate(&self, platform: JobPlatform, operation: Option<Operation>) -> usize {
        self.cache
            .invalidate_by_prefix(&ResultCache::key_prefix(platform, operation))
    }

    /// 缓存统计（管理操作）
    pub fn cache_statistics(&self) -> CacheStatistics {
        self.cache.statistics()
    }

    /// 代理池统计（管理操作）
    pub fn pool_statistics(&self) -> PoolStatistics {
        self.pool.statistics()
    }
}

impl From<QueueError> for ScrapeError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Repository(inner) => ScrapeError::Repository(inner),
        }
    }
}
