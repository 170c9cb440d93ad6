// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::application::orchestrator::TaskExecutor;
use crate::config::settings::WorkerSettings;
use crate::domain::models::task::ScrapeTask;
use crate::queue::task_queue::TaskQueue;

/// 执行器状态
///
/// 状态机：Idle → Claiming → Executing → Idle，
/// 关停走带外路径 Draining → Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    /// 空闲，等待下一轮认领
    Idle,
    /// 正在认领任务
    Claiming,
    /// 正在执行任务
    Executing,
    /// 收到下线信号，完成当前任务后退出
    Draining,
    /// 已停止
    Stopped,
}

/// 执行器上报给监督器的事件
///
/// 执行器与监督器之间只通过消息传递通信，不共享可变状态
#[derive(Debug, Clone)]
pub enum ExecutorEvent {
    /// 存活心跳（每30秒）
    Heartbeat {
        worker_id: Uuid,
        state: ExecutorState,
        at: DateTime<Utc>,
    },
    /// 吞吐量上报（每60秒）
    Throughput {
        worker_id: Uuid,
        processed: u64,
        succeeded: u64,
    },
}

/// 执行器与其心跳任务共享的内部状态
struct ExecutorShared {
    state: Mutex<ExecutorState>,
    current_task: Mutex<Option<Uuid>>,
    processed: AtomicU64,
    succeeded: AtomicU64,
}

/// 抓取执行器
///
/// 空闲时按固定间隔轮询claim_next；认领到任务后恰好调用
/// 一次编排器，然后complete/fail回到空闲。每个执行器同一
/// 时刻至多一个任务在途，无内部并发。
pub struct ScrapeWorker<Q, E>
where
    Q: TaskQueue + 'static,
    E: TaskExecutor + 'static,
{
    worker_id: Uuid,
    queue: Arc<Q>,
    executor: Arc<E>,
    events: mpsc::UnboundedSender<ExecutorEvent>,
    drain_rx: watch::Receiver<bool>,
    config: WorkerSettings,
    shared: Arc<ExecutorShared>,
}

impl<Q, E> ScrapeWorker<Q, E>
where
    Q: TaskQueue + Send + Sync + 'static,
    E: TaskExecutor + Send + Sync + 'static,
{
    /// 创建新的抓取执行器实例
    pub fn new(
        queue: Arc<Q>,
        executor: Arc<E>,
        events: mpsc::UnboundedSender<ExecutorEvent>,
        drain_rx: watch::Receiver<bool>,
        config: WorkerSettings,
    ) -> Self {
        Self {
            worker_id: Uuid::new_v4(),
            queue,
            executor,
            events,
            drain_rx,
            config,
            shared: Arc::new(ExecutorShared {
                state: Mutex::new(ExecutorState::Idle),
                current_task: Mutex::new(None),
                processed: AtomicU64::new(0),
                succeeded: AtomicU64::new(0),
            }),
        }
    }

    /// 执行器ID
    pub fn id(&self) -> Uuid {
        self.worker_id
    }

    /// 运行执行器主循环
    pub async fn run(mut self) {
        info!("Scrape executor {} started", self.worker_id);

        let ticker = self.spawn_heartbeat_ticker();

        loop {
            if *self.drain_rx.borrow() {
                *self.shared.state.lock() = ExecutorState::Draining;
                info!("Executor {} draining", self.worker_id);
                break;
            }

            *self.shared.state.lock() = ExecutorState::Claiming;
            match self.queue.claim_next(self.worker_id).await {
                Ok(Some(task)) => {
                    self.process_task(task).await;
                }
                Ok(None) => {
                    *self.shared.state.lock() = ExecutorState::Idle;
                    let poll = Duration::from_secs(self.config.poll_interval_secs);
                    tokio::select! {
                        _ = sleep(poll) => {}
                        _ = self.drain_rx.changed() => {}
                    }
                }
                Err(e) => {
                    error!("Executor {} claim failed: {}", self.worker_id, e);
                    *self.shared.state.lock() = ExecutorState::Idle;
                    sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
                }
            }
        }

        *self.shared.state.lock() = ExecutorState::Stopped;
        let _ = self.events.send(ExecutorEvent::Heartbeat {
            worker_id: self.worker_id,
            state: ExecutorState::Stopped,
            at: Utc::now(),
        });
        ticker.abort();
        info!("Scrape executor {} stopped", self.worker_id);
    }

    #[instrument(skip(self, task), fields(worker_id = %self.worker_id, task_id = %task.id, platform = %task.platform, operation = %task.operation))]
    async fn process_task(&self, task: ScrapeTask) {
        info!("Processing task");
        *self.shared.state.lock() = ExecutorState::Executing;
        *self.shared.current_task.lock() = Some(task.id);

        let outcome = self.executor.execute(&task).await;
        let result = match outcome {
            Ok(value) => {
                self.shared.succeeded.fetch_add(1, Ordering::Relaxed);
                self.queue.complete(task.id, value).await
            }
            Err(e) => {
                debug!("Task failed: {}", e);
                self.queue.fail(task.id, e.to_string()).await
            }
        };
        if let Err(e) = result {
            error!("Failed to finalize task {}: {}", task.id, e);
        }

        self.shared.processed.fetch_add(1, Ordering::Relaxed);
        *self.shared.current_task.lock() = None;
        *self.shared.state.lock() = ExecutorState::Idle;
        metrics::counter!("worker_tasks_processed_total").increment(1);
    }

    /// 启动心跳/吞吐量上报任务
    ///
    /// 心跳tick在任务执行期间同时负责续约，正在执行的长任务
    /// 不会被维护调度器误回收
    fn spawn_heartbeat_ticker(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let events = self.events.clone();
        let queue = self.queue.clone();
        let worker_id = self.worker_id;
        let heartbeat_secs = self.config.heartbeat_interval_secs;
        let throughput_secs = self.config.throughput_interval_secs;

        tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(Duration::from_secs(heartbeat_secs));
            let mut throughput = tokio::time::interval(Duration::from_secs(throughput_secs));
            heartbeat.tick().await;
            throughput.tick().await;

            loop {
                tokio::select! {
                    _ = heartbeat.tick() => {
                        let state = *shared.state.lock();
                        let _ = events.send(ExecutorEvent::Heartbeat {
                            worker_id,
                            state,
                            at: Utc::now(),
                        });

                        if state == ExecutorState::Executing {
                            let current = *shared.current_task.lock();
                            if let Some(task_id) = current {
                                if let Err(e) = queue.extend_lease(task_id, worker_id).await {
                                    error!("Lease renewal for task {} failed: {}", task_id, e);
                                }
                            }
                        }
                    }
                    _ = throughput.tick() => {
                        let _ = events.send(ExecutorEvent::Throughput {
                            worker_id,
                            processed: shared.processed.load(Ordering::Relaxed),
                            succeeded: shared.succeeded.load(Ordering::Relaxed),
                        });
                    }
                }
            }
        })
    }
}
