// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use harvestrs::adapters::dispatch::PlatformRouter;
use harvestrs::adapters::identity::IdentityRotator;
use harvestrs::adapters::traits::AdapterRouter;
use harvestrs::application::orchestrator::ScrapeOrchestrator;
use harvestrs::config::settings::Settings;
use harvestrs::infrastructure::cache::result_cache::ResultCache;
use harvestrs::infrastructure::database::connection;
use harvestrs::infrastructure::proxy::health::ProxyHealthChecker;
use harvestrs::infrastructure::proxy::pool::ProxyPoolManager;
use harvestrs::infrastructure::proxy::provider::provider_from_settings;
use harvestrs::infrastructure::repositories::quota_repo_impl::QuotaRepositoryImpl;
use harvestrs::infrastructure::repositories::task_repo_impl::TaskRepositoryImpl;
use harvestrs::queue::scheduler::MaintenanceScheduler;
use harvestrs::queue::task_queue::DatabaseTaskQueue;
use harvestrs::utils::telemetry;
use harvestrs::workers::supervisor::{SystemLoadSampler, WorkerSupervisor};
use migration::{Migrator, MigratorTrait};
use std::sync::Arc;
use tracing::{info, warn};

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动工作器池
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting harvestrs...");

    // 2. Load configuration
    let settings = Arc::new(Settings::new()?);
    info!("Configuration loaded");

    // Initialize Prometheus Metrics
    harvestrs::infrastructure::metrics::init_metrics(&settings.metrics);

    // 3. Connect to database
    let db = connection::create_pool(&settings.database).await?;
    let db = Arc::new(db);
    info!("Database connection established");

    // Run database migrations
    info!("Running database migrations...");
    Migrator::up(db.as_ref(), None).await?;
    info!("Database migrations applied");

    // 4. Initialize repositories and queue
    let task_repo = Arc::new(TaskRepositoryImpl::new(db.clone()));
    let quota_repo = Arc::new(QuotaRepositoryImpl::new(db.clone()));
    let queue = Arc::new(DatabaseTaskQueue::new(
        task_repo.clone(),
        chrono::Duration::seconds(settings.queue.lease_secs),
    ));

    // 5. Initialize proxy pool and run the first provider sync
    let mut providers = Vec::new();
    for provider_settings in &settings.proxy.providers {
        match provider_from_settings(provider_settings) {
            Ok(provider) => providers.push(provider),
            Err(e) => warn!("Skipping provider: {}", e),
        }
    }
    if providers.is_empty() {
        warn!("No proxy providers configured, scraping will fail until endpoints exist");
    }
    let pool = Arc::new(ProxyPoolManager::new(providers, settings.proxy.clone()));
    pool.refresh().await;
    let _refresh_handle = pool.start_refresh_loop();
    let health_checker = Arc::new(ProxyHealthChecker::new(pool.clone(), settings.proxy.clone()));
    let _health_handle = health_checker.start();
    info!("Proxy pool initialized with {} endpoints", pool.len());

    // 6. Initialize result cache and its background sweeps
    let cache = Arc::new(ResultCache::new(settings.cache.clone()));
    let _sweeper_handle = cache.start_sweeper();
    info!("Result cache initialized");

    // 7. Initialize the orchestrator shared by every executor
    let router: Arc<dyn AdapterRouter> = Arc::new(PlatformRouter::new(&settings.adapters));
    let identities = Arc::new(IdentityRotator::new());
    let orchestrator = Arc::new(ScrapeOrchestrator::new(
        cache.clone(),
        pool.clone(),
        router,
        identities,
    ));

    // 8. Start maintenance scheduler
    let scheduler =
        MaintenanceScheduler::new(task_repo.clone(), quota_repo.clone(), settings.queue.clone());
    let _scheduler_handle = scheduler.start();

    // 9. Start worker pool and run until shutdown
    let sampler = Arc::new(SystemLoadSampler::new());
    let mut supervisor = WorkerSupervisor::new(
        queue.clone(),
        orchestrator.clone(),
        sampler,
        settings.workers.clone(),
    );
    supervisor.start(settings.workers.max_workers);
    supervisor.run().await;

    Ok(())
}
