// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::orchestrator::TaskExecutor;
use crate::config::settings::WorkerSettings;
use crate::queue::task_queue::TaskQueue;
use crate::workers::scrape_worker::{ExecutorEvent, ExecutorState, ScrapeWorker};

/// 系统负载采样特质
///
/// 自动伸缩的输入，生产实现基于系统CPU占用
pub trait LoadSampler: Send + Sync {
    /// 采样当前负载，归一化到 [0, 1]
    fn sample(&self) -> f64;
}

/// 基于sysinfo的负载采样器
pub struct SystemLoadSampler {
    system: Mutex<System>,
}

impl SystemLoadSampler {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemLoadSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadSampler for SystemLoadSampler {
    fn sample(&self) -> f64 {
        let mut system = self.system.lock();
        system.refresh_cpu_usage();
        (system.global_cpu_usage() as f64 / 100.0).clamp(0.0, 1.0)
    }
}

/// 监督器侧的执行器簿记
///
/// 仅存活于内存，不做持久化
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub worker_id: Uuid,
    pub state: ExecutorState,
    pub last_heartbeat_at: DateTime<Utc>,
    pub busy: bool,
    pub processed: u64,
    pub succeeded: u64,
    pub started_at: DateTime<Utc>,
}

/// 执行器句柄
struct ExecutorHandle {
    worker_id: Uuid,
    handle: JoinHandle<()>,
    drain_tx: watch::Sender<bool>,
    started_at: DateTime<Utc>,
}

/// 工作器池监督器
///
/// 拥有一组并发执行器：监听心跳与吞吐量事件、替换失联
/// 执行器、按采样负载在配置的上下限之间伸缩。与执行器
/// 只通过消息传递通信。
pub struct WorkerSupervisor<Q, E>
where
    Q: TaskQueue + Send + Sync + 'static,
    E: TaskExecutor + Send + Sync + 'static,
{
    queue: Arc<Q>,
    executor: Arc<E>,
    sampler: Arc<dyn LoadSampler>,
    config: WorkerSettings,
    executors: Vec<ExecutorHandle>,
    records: HashMap<Uuid, WorkerRecord>,
    event_tx: mpsc::UnboundedSender<ExecutorEvent>,
    event_rx: mpsc::UnboundedReceiver<ExecutorEvent>,
}

impl<Q, E> WorkerSupervisor<Q, E>
where
    Q: TaskQueue + Send + Sync + 'static,
    E: TaskExecutor + Send + Sync + 'static,
{
    /// 创建新的监督器实例
    pub fn new(
        queue: Arc<Q>,
        executor: Arc<E>,
        sampler: Arc<dyn LoadSampler>,
        config: WorkerSettings,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            queue,
            executor,
            sampler,
            config,
            executors: Vec::new(),
            records: HashMap::new(),
            event_tx,
            event_rx,
        }
    }

    /// 启动执行器
    ///
    /// 实际数量为 min(请求数, 配置上限, 可用并行度)
    pub fn start(&mut self, count: usize) {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let target = count.min(self.config.max_workers).min(parallelism).max(1);

        for _ in 0..target {
            self.spawn_executor();
        }
        info!("Started {} scrape executors", self.executors.len());
    }

    /// 当前执行器数量
    pub fn executor_count(&self) -> usize {
        self.executors.len()
    }

    /// 执行器簿记快照
    pub fn records(&self) -> Vec<WorkerRecord> {
        self.records.values().cloned().collect()
    }

    fn spawn_executor(&mut self) -> Uuid {
        let (drain_tx, drain_rx) = watch::channel(false);
        let worker = ScrapeWorker::new(
            self.queue.clone(),
            self.executor.clone(),
            self.event_tx.clone(),
            drain_rx,
            self.config.clone(),
        );
        let worker_id = worker.id();
        let now = Utc::now();

        let handle = tokio::spawn(async move {
            worker.run().await;
        });

        self.executors.push(ExecutorHandle {
            worker_id,
            handle,
            drain_tx,
            started_at: now,
        });
        self.records.insert(
            worker_id,
            WorkerRecord {
                worker_id,
                state: ExecutorState::Idle,
                last_heartbeat_at: now,
                busy: false,
                processed: 0,
                succeeded: 0,
                started_at: now,
            },
        );
        metrics::gauge!("worker_pool_size").set(self.executors.len() as f64);
        worker_id
    }

    /// 处理执行器事件
    fn handle_event(&mut self, event: ExecutorEvent) {
        match event {
            ExecutorEvent::Heartbeat {
                worker_id,
                state,
                at,
            } => {
                if let Some(record) = self.records.get_mut(&worker_id) {
                    record.state = state;
                    record.busy = state == ExecutorState::Executing;
                    record.last_heartbeat_at = at;
                }
            }
            ExecutorEvent::Throughput {
                worker_id,
                processed,
                succeeded,
            } => {
                if let Some(record) = self.records.get_mut(&worker_id) {
                    record.processed = processed;
                    record.succeeded = succeeded;
                }
            }
        }
    }

    /// 失联检查
    ///
    /// 超过liveness_timeout未见心跳的执行器强制终止并替换
    fn check_liveness(&mut self) {
        let timeout_secs = ChronoDuration::seconds(self.config.liveness_timeout_secs);
        let now = Utc::now();

        let unresponsive: Vec<Uuid> = self
            .records
            .values()
            .filter(|r| now - r.last_heartbeat_at > timeout_secs)
            .map(|r| r.worker_id)
            .collect();

        for worker_id in unresponsive {
            warn!("Executor {} unresponsive, force-replacing", worker_id);
            if let Some(index) = self
                .executors
                .iter()
                .position(|e| e.worker_id == worker_id)
            {
                let handle = self.executors.remove(index);
                handle.handle.abort();
            }
            self.records.remove(&worker_id);
            self.spawn_executor();
        }
    }

    /// 自动伸缩决策
    ///
    /// 负载高于高水位且未达上限时扩容一个；低于低水位且
    /// 超过下限时优雅下线最近启动的执行器
    pub fn autoscale_tick(&mut self, load: f64) {
        let count = self.executors.len();

        if load > self.config.high_water_mark && count < self.config.max_workers {
            let worker_id = self.spawn_executor();
            info!(
                "Load {:.2} above high water mark, scaled up to {} (new executor {})",
                load,
                self.executors.len(),
                worker_id
            );
        } else if load < self.config.low_water_mark && count > self.config.min_workers.max(1) {
            self.drain_newest();
            info!(
                "Load {:.2} below low water mark, scaled down to {}",
                load,
                self.executors.len()
            );
        }
    }

    /// 优雅下线最近启动的执行器
    ///
    /// 发出下线信号，宽限期内允许完成当前任务，超时强制终止。
    /// 被强制终止的在途任务停留在Processing，由维护调度器的
    /// 租约回收路径重新入队。
    fn drain_newest(&mut self) {
        let Some(index) = self
            .executors
            .iter()
            .enumerate()
            .max_by_key(|(_, e)| e.started_at)
            .map(|(i, _)| i)
        else {
            return;
        };

        let executor = self.executors.remove(index);
        self.records.remove(&executor.worker_id);
        let _ = executor.drain_tx.send(true);

        let grace = Duration::from_secs(self.config.drain_grace_secs);
        let worker_id = executor.worker_id;
        let mut handle = executor.handle;
        tokio::spawn(async move {
            if timeout(grace, &mut handle).await.is_err() {
                warn!(
                    "Executor {} did not drain within grace period, aborting",
                    worker_id
                );
                handle.abort();
            }
        });
        metrics::gauge!("worker_pool_size").set(self.executors.len() as f64);
    }

    /// 运行监督循环直到收到关停信号
    pub async fn run(mut self) {
        let mut autoscale = interval(Duration::from_secs(self.config.autoscale_interval_secs));
        let mut liveness = interval(Duration::from_secs(15));
        autoscale.tick().await;
        liveness.tick().await;

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                Some(event) = self.event_rx.recv() => {
                    self.handle_event(event);
                }
                _ = autoscale.tick() => {
                    let load = self.sampler.sample();
                    self.autoscale_tick(load);
                }
                _ = liveness.tick() => {
                    self.check_liveness();
                }
                result = &mut shutdown => {
                    match result {
                        Ok(()) => info!("Shutdown signal received"),
                        Err(e) => error!("Unable to listen for shutdown signal: {}", e),
                    }
                    break;
                }
            }
        }

        self.shutdown().await;
    }

    /// 优雅关停全部执行器
    ///
    /// 下线信号后等待宽限期，未退出者强制终止；
    /// 在途任务交由租约回收路径重新入队
    pub async fn shutdown(&mut self) {
        info!("Shutting down {} executors...", self.executors.len());

        for executor in &self.executors {
            let _ = executor.drain_tx.send(true);
        }

        let grace = Duration::from_secs(self.config.drain_grace_secs);
        for mut executor in self.executors.drain(..) {
            if timeout(grace, &mut executor.handle).await.is_err() {
                warn!("Executor {} force-stopped at shutdown", executor.worker_id);
                executor.handle.abort();
            }
        }
        self.records.clear();

        info!("Workers shut down successfully");
    }
}
