// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration as TokioDuration};
use tracing::{error, info};

use crate::config::settings::QueueSettings;
use crate::domain::repositories::quota_repository::QuotaRepository;
use crate::domain::repositories::task_repository::TaskRepository;

/// 维护调度器
///
/// 后台维护工作：回收租约过期的Processing任务使其可被
/// 重新认领、清理保留期之外的终态任务、滚动过期的配额窗口。
/// 实际的任务调度由执行器通过claim_next主动拉取。
pub struct MaintenanceScheduler<R, P>
where
    R: TaskRepository + Send + Sync + 'static,
    P: QuotaRepository + Send + Sync + 'static,
{
    /// 任务仓库
    task_repository: Arc<R>,
    /// 配额仓库
    quota_repository: Arc<P>,
    /// 队列配置
    config: QueueSettings,
}

impl<R, P> MaintenanceScheduler<R, P>
where
    R: TaskRepository + Send + Sync + 'static,
    P: QuotaRepository + Send + Sync + 'static,
{
    /// 创建新的维护调度器实例
    pub fn new(task_repository: Arc<R>, quota_repository: Arc<P>, config: QueueSettings) -> Self {
        Self {
            task_repository,
            quota_repository,
            config,
        }
    }

    /// 启动调度器后台任务
    ///
    /// 租约回收每个维护周期执行；终态清理与配额滚动
    /// 至少每小时执行一次
    pub fn start(&self) -> JoinHandle<()> {
        let task_repository = self.task_repository.clone();
        let quota_repository = self.quota_repository.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            let tick_secs = config.maintenance_interval_secs.max(1);
            let mut ticker = interval(TokioDuration::from_secs(tick_secs));
            let hourly_every = (3600 / tick_secs).max(1);
            let mut tick_count: u64 = 0;

            loop {
                ticker.tick().await;
                tick_count += 1;

                match task_repository.reclaim_expired().await {
                    Ok(count) => {
                        if count > 0 {
                            info!("Reclaimed {} tasks with expired leases", count);
                        }
                    }
                    Err(e) => {
                        error!("Failed to reclaim expired tasks: {}", e);
                    }
                }

                if tick_count % hourly_every == 0 {
                    let cutoff =
                        (chrono::Utc::now() - ChronoDuration::days(config.retention_days)).into();
                    match task_repository.purge_terminal_older_than(cutoff).await {
                        Ok(count) => {
                            if count > 0 {
                                info!("Purged {} terminal tasks past retention", count);
                            }
                        }
                        Err(e) => {
                            error!("Failed to purge terminal tasks: {}", e);
                        }
                    }

                    match quota_repository.rollover_expired().await {
                        Ok(count) => {
                            if count > 0 {
                                info!("Rolled over {} quota counters", count);
                            }
                        }
                        Err(e) => {
                            error!("Failed to roll over quota counters: {}", e);
                        }
                    }
                }
            }
        })
    }
}
