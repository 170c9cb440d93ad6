// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Duration;
use harvestrs::adapters::identity::IdentityRotator;
use harvestrs::adapters::traits::{AdapterError, AdapterRouter, FetchContext};
use harvestrs::application::orchestrator::ScrapeOrchestrator;
use harvestrs::application::quota_gate::QuotaGate;
use harvestrs::application::service::{AggregationService, RequestOutcome};
use harvestrs::application::dto::requests::SearchRequestDto;
use harvestrs::config::settings::{CacheSettings, ProxyPoolSettings};
use harvestrs::domain::models::job::{
    DetailsParams, JobDetails, JobPlatform, JobPosting, SearchParams,
};
use harvestrs::domain::models::proxy::{ProxyGeo, ProxyKey, ProxyRecord, ProxyTransport};
use harvestrs::domain::models::quota::{RoutingMode, SubscriberTier, TierLimits, TierTable};
use harvestrs::domain::models::task::TaskStatus;
use harvestrs::infrastructure::cache::result_cache::ResultCache;
use harvestrs::infrastructure::proxy::pool::ProxyPoolManager;
use harvestrs::infrastructure::repositories::quota_repo_impl::QuotaRepositoryImpl;
use harvestrs::infrastructure::repositories::task_repo_impl::TaskRepositoryImpl;
use harvestrs::queue::task_queue::{DatabaseTaskQueue, TaskQueue};
use harvestrs::utils::errors::ScrapeError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::helpers::setup_database;

/// 记录调用次数的适配器路由桩
struct CountingRouter {
    search_calls: AtomicUsize,
    details_calls: AtomicUsize,
    /// 返回Blocked而不是结果
    blocked: bool,
}

impl CountingRouter {
    fn new(blocked: bool) -> Self {
        Self {
            search_calls: AtomicUsize::new(0),
            details_calls: AtomicUsize::new(0),
            blocked,
        }
    }
}

#[async_trait]
impl AdapterRouter for CountingRouter {
    async fn search(
        &self,
        platform: JobPlatform,
        _params: &SearchParams,
        _ctx: &FetchContext,
    ) -> Result<Vec<JobPosting>, AdapterError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.blocked {
            return Err(AdapterError::Blocked { status: Some(403) });
        }
        Ok(vec![JobPosting {
            platform,
            subject_id: "job-1".into(),
            title: "Rust Engineer".into(),
            company: "Ferrous Corp".into(),
            location: Some("Berlin".into()),
            url: "https://example.invalid/job-1".into(),
            salary: None,
            posted_at: None,
        }])
    }

    async fn details(
        &self,
        platform: JobPlatform,
        params: &DetailsParams,
        _ctx: &FetchContext,
    ) -> Result<JobDetails, AdapterError> {
        self.details_calls.fetch_add(1, Ordering::SeqCst);
        if self.blocked {
            return Err(AdapterError::Blocked { status: Some(403) });
        }
        Ok(JobDetails {
            platform,
            subject_id: params.subject_id.clone(),
            title: "Rust Engineer".into(),
            company: "Ferrous Corp".into(),
            location: None,
            description: "Build the aggregation core.".into(),
            url: params.url.clone(),
            salary: None,
            employment_type: None,
            posted_at: None,
        })
    }
}

fn pool_settings() -> ProxyPoolSettings {
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

fn cache_settings() -> CacheSettings {
    CacheSettings {
        default_ttl_secs: 1800,
        max_entries: 100,
        eviction_policy: "lru".into(),
        expiry_sweep_secs: 300,
        capacity_sweep_secs: 600,
    }
}

fn single_proxy() -> ProxyRecord {
    ProxyRecord::new(
        ProxyKey {
            provider: "static".into(),
            host: "10.0.0.1".into(),
            port: 8080,
        },
        None,
        ProxyTransport::Http,
        ProxyGeo::default(),
        false,
    )
}

struct Stack {
    router: Arc<CountingRouter>,
    pool: Arc<ProxyPoolManager>,
    cache: Arc<ResultCache>,
    orchestrator: Arc<ScrapeOrchestrator>,
}

fn build_stack(blocked: bool, with_proxy: bool) -> Stack {
    let router = Arc::new(CountingRouter::new(blocked));
    let pool = Arc::new(ProxyPoolManager::new(vec![], pool_settings()));
    if with_proxy {
        pool.upsert(single_proxy());
    }
    let cache = Arc::new(ResultCache::new(cache_settings()));
    let orchestrator = Arc::new(ScrapeOrchestrator::new(
        cache.clone(),
        pool.clone(),
        router.clone(),
        Arc::new(IdentityRotator::new()),
    ));
    Stack {
        router,
        pool,
        cache,
        orchestrator,
    }
}

fn search_params() -> SearchParams {
    SearchParams {
        keywords: vec!["x".into()],
        location: None,
        remote: None,
        limit: None,
    }
}

#[tokio::test]
async fn test_cold_request_uses_one_proxy_one_adapter_call_one_cache_store() {
    let stack = build_stack(false, true);

    let result = stack
        .orchestrator
        .search(JobPlatform::Linkedin, &search_params())
        .await
        .unwrap();

    assert_eq!(stack.router.search_calls.load(Ordering::SeqCst), 1);
    assert!(result.is_array());

    let pool_stats = stack.pool.statistics();
    assert_eq!(pool_stats.total_success, 1);
    assert_eq!(pool_stats.total_failure, 0);

    let cache_stats = stack.cache.statistics();
    assert_eq!(cache_stats.entry_count, 1);
    assert_eq!(cache_stats.stores, 1);
}

#[tokio::test]
async fn test_repeat_request_within_ttl_skips_adapter_and_pool() {
    let stack = build_stack(false, true);
    let params = search_params();

    let first = stack
        .orchestrator
        .search(JobPlatform::Linkedin, &params)
        .await
        .unwrap();
    let second = stack
        .orchestrator
        .search(JobPlatform::Linkedin, &params)
        .await
        .unwrap();

    assert_eq!(first, second);
    // 命中缓存：适配器零调用，代理池零新增成功
    assert_eq!(stack.router.search_calls.load(Ordering::SeqCst), 1);
    assert_eq!(stack.pool.statistics().total_success, 1);
}

#[tokio::test]
async fn test_blocked_response_penalizes_proxy_and_caches_nothing() {
    let stack = build_stack(true, true);

    let result = stack
        .orchestrator
        .search(JobPlatform::Linkedin, &search_params())
        .await;
    assert!(matches!(result, Err(ScrapeError::BlockedByTarget)));

    let pool_stats = stack.pool.statistics();
    assert_eq!(pool_stats.total_bans, 1);
    assert_eq!(stack.cache.statistics().entry_count, 0);

    // 失败未被缓存：重试会再次调用适配器
    let _ = stack
        .orchestrator
        .search(JobPlatform::Linkedin, &search_params())
        .await;
    assert_eq!(stack.router.search_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_exhausted_pool_fails_before_adapter() {
    let stack = build_stack(false, false);

    let result = stack
        .orchestrator
        .search(JobPlatform::Linkedin, &search_params())
        .await;
    assert!(matches!(result, Err(ScrapeError::NoProxyAvailable)));
    assert_eq!(stack.router.search_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_details_flow_reports_success_and_caches() {
    let stack = build_stack(false, true);
    let params = DetailsParams {
        subject_id: "job-9".into(),
        url: None,
    };

    let value = stack
        .orchestrator
        .details(JobPlatform::Indeed, &params)
        .await
        .unwrap();
    assert_eq!(value["subject_id"], "job-9");
    assert_eq!(stack.router.details_calls.load(Ordering::SeqCst), 1);
    assert_eq!(stack.cache.statistics().entry_count, 1);
}

fn tier_table() -> TierTable {
    let limits = |search, detail, routing| TierLimits {
        search_daily: search,
        detail_daily: detail,
        routing,
    };
    TierTable {
        free: limits(5, 5, RoutingMode::Deferred),
        basic: limits(5, 5, RoutingMode::Deferred),
        pro: limits(5, 5, RoutingMode::Immediate),
        enterprise: limits(5, 5, RoutingMode::Immediate),
    }
}

#[tokio::test]
async fn test_immediate_tier_returns_results_inline() {
    let test_db = setup_database().await;
    let stack = build_stack(false, true);
    let task_repo = Arc::new(TaskRepositoryImpl::new(test_db.db.clone()));
    let quota_repo = Arc::new(QuotaRepositoryImpl::new(test_db.db.clone()));
    let queue = Arc::new(DatabaseTaskQueue::new(task_repo, Duration::seconds(300)));
    let gate = Arc::new(QuotaGate::new(quota_repo, tier_table()));
    let service = AggregationService::new(
        gate,
        stack.orchestrator.clone(),
        queue,
        stack.cache.clone(),
        stack.pool.clone(),
    );

    let outcome = service
        .search(
            Uuid::new_v4(),
            SubscriberTier::Pro,
            JobPlatform::Linkedin,
            SearchRequestDto {
                keywords: vec!["rust".into()],
                location: None,
                remote: None,
                limit: Some(10),
            },
        )
        .await
        .unwrap();

    match outcome {
        RequestOutcome::Completed { result } => {
            assert!(result.is_array());
            assert_eq!(stack.router.search_calls.load(Ordering::SeqCst), 1);
        }
        RequestOutcome::Deferred { .. } => panic!("pro tier must execute immediately"),
    }
}

#[tokio::test]
async fn test_deferred_tier_enqueues_and_worker_path_completes_it() {
    let test_db = setup_database().await;
    let stack = build_stack(false, true);
    let task_repo = Arc::new(TaskRepositoryImpl::new(test_db.db.clone()));
    let quota_repo = Arc::new(QuotaRepositoryImpl::new(test_db.db.clone()));
    let queue = Arc::new(DatabaseTaskQueue::new(
        task_repo,
        Duration::seconds(300),
    ));
    let gate = Arc::new(QuotaGate::new(quota_repo, tier_table()));
    let owner = Uuid::new_v4();
    let service = AggregationService::new(
        gate,
        stack.orchestrator.clone(),
        queue.clone(),
        stack.cache.clone(),
        stack.pool.clone(),
    );

    let outcome = service
        .search(
            owner,
            SubscriberTier::Free,
            JobPlatform::Linkedin,
            SearchRequestDto {
                keywords: vec!["rust".into()],
                location: None,
                remote: None,
                limit: Some(10),
            },
        )
        .await
        .unwrap();

    let task_id = match outcome {
        RequestOutcome::Deferred { task_id } => task_id,
        RequestOutcome::Completed { .. } => panic!("free tier must defer"),
    };

    // 延迟路由在入队时不触碰适配器
    assert_eq!(stack.router.search_calls.load(Ordering::SeqCst), 0);
    let status = service.task_status(owner, task_id).await.unwrap();
    assert_eq!(status.status, TaskStatus::Pending);

    // 队列执行路径与立即路径共用同一个编排器
    let claimed = queue.claim_next(Uuid::new_v4()).await.unwrap().unwrap();
    assert_eq!(claimed.id, task_id);
    let value = harvestrs::application::orchestrator::TaskExecutor::execute(
        stack.orchestrator.as_ref(),
        &claimed,
    )
    .await
    .unwrap();
    queue.complete(claimed.id, value).await.unwrap();

    let done = service.task_status(owner, task_id).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert!(done.result.is_some());
    assert_eq!(stack.router.search_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_task_status_enforces_ownership() {
    let test_db = setup_database().await;
    let stack = build_stack(false, true);
    let task_repo = Arc::new(TaskRepositoryImpl::new(test_db.db.clone()));
    let quota_repo = Arc::new(QuotaRepositoryImpl::new(test_db.db.clone()));
    let queue = Arc::new(DatabaseTaskQueue::new(task_repo, Duration::seconds(300)));
    let gate = Arc::new(QuotaGate::new(quota_repo, tier_table()));
    let owner = Uuid::new_v4();
    let service = AggregationService::new(
        gate,
        stack.orchestrator.clone(),
        queue,
        stack.cache.clone(),
        stack.pool.clone(),
    );

    let outcome = service
        .search(
            owner,
            SubscriberTier::Free,
            JobPlatform::Indeed,
            SearchRequestDto {
                keywords: vec!["rust".into()],
                location: None,
                remote: None,
                limit: None,
            },
        )
        .await
        .unwrap();
    let task_id = match outcome {
        RequestOutcome::Deferred { task_id } => task_id,
        _ => panic!("free tier must defer"),
    };

    let stranger = Uuid::new_v4();
    assert!(matches!(
        service.task_status(stranger, task_id).await,
        Err(ScrapeError::Unauthorized)
    ));
    assert!(matches!(
        service.task_status(owner, Uuid::new_v4()).await,
        Err(ScrapeError::TaskNotFound)
    ));
}

#[tokio::test]
async fn test_admin_invalidation_clears_platform_entries() {
    let test_db = setup_database().await;
    let stack = build_stack(false, true);
    let task_repo = Arc::new(TaskRepositoryImpl::new(test_db.db.clone()));
    let quota_repo = Arc::new(QuotaRepositoryImpl::new(test_db.db.clone()));
    let queue = Arc::new(DatabaseTaskQueue::new(task_repo, Duration::seconds(300)));
    let gate = Arc::new(QuotaGate::new(quota_repo, tier_table()));
    let service = AggregationService::new(
        gate,
        stack.orchestrator.clone(),
        queue,
        stack.cache.clone(),
        stack.pool.clone(),
    );

    stack
        .orchestrator
        .search(JobPlatform::Linkedin, &search_params())
        .await
        .unwrap();
    stack
        .orchestrator
        .details(
            JobPlatform::Indeed,
            &DetailsParams {
                subject_id: "job-1".into(),
                url: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(service.cache_statistics().entry_count, 2);

    let removed = service.invalidate(JobPlatform::Linkedin, None);
    assert_eq!(removed, 1);
    assert_eq!(service.cache_statistics().entry_count, 1);

    service.clear_cache();
    assert_eq!(service.cache_statistics().entry_count, 0);

    // 池统计管理接口同样可用
    assert_eq!(service.pool_statistics().total, 1);
}
