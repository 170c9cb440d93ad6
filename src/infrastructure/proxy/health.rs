// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::settings::ProxyPoolSettings;
use crate::domain::models::proxy::ProxyRecord;
use crate::infrastructure::proxy::pool::ProxyPoolManager;

/// 封禁信号状态码判定
///
/// HTTP 403/429/503 视为目标或提供商发出的封锁信号
pub fn is_ban_status(status: u16) -> bool {
    matches!(status, 403 | 429 | 503)
}

/// 单次探测结果
enum ProbeOutcome {
    /// 成功，附带响应时间（毫秒）
    Ok(f64),
    /// 封禁信号
    Banned,
    /// 一般失败（超时、网络错误、异常状态码）
    Failed,
}

/// 代理健康检查器
///
/// 按固定批次轮询池内端点，通过每个端点发起轻量探测请求，
/// 成功更新响应时间EMA与成功计数，失败按封禁/一般失败分类回报。
pub struct ProxyHealthChecker {
    pool: Arc<ProxyPoolManager>,
    config: ProxyPoolSettings,
    /// 批次游标，跨轮次在池上轮转
    cursor: AtomicUsize,
}

impl ProxyHealthChecker {
    /// 创建新的健康检查器
    pub fn new(pool: Arc<ProxyPoolManager>, config: ProxyPoolSettings) -> Self {
        Self {
            pool,
            config,
            cursor: AtomicUsize::new(0),
        }
    }

    /// 执行一轮批次探测
    pub async fn run_once(&self) {
        let mut records = self.pool.all_records();
        if records.is_empty() {
            debug!("Health check skipped: pool is empty");
            return;
        }
        // 稳定排序保证游标在轮次之间覆盖全池
        records.sort_by(|a, b| a.key.to_string().cmp(&b.key.to_string()));

        let batch_size = self.config.health_batch_size.max(1);
        let start = self.cursor.fetch_add(batch_size, Ordering::Relaxed) % records.len();
        let batch: Vec<ProxyRecord> = records
            .iter()
            .cycle()
            .skip(start)
            .take(batch_size.min(records.len()))
            .cloned()
            .collect();

        let mut ok = 0usize;
        let mut banned = 0usize;
        let mut failed = 0usize;

        for record in batch {
            match self.probe(&record).await {
                ProbeOutcome::Ok(elapsed_ms) => {
                    self.pool.report_success(&record.key, elapsed_ms);
                    ok += 1;
                }
                ProbeOutcome::Banned => {
                    self.pool.report_failure(&record.key, true);
                    banned += 1;
                }
                ProbeOutcome::Failed => {
                    self.pool.report_failure(&record.key, false);
                    failed += 1;
                }
            }
        }

        info!(
            "Health check batch done: {} ok, {} banned, {} failed",
            ok, banned, failed
        );
    }

    /// 通过端点探测目标URL
    async fn probe(&self, record: &ProxyRecord) -> ProbeOutcome {
        let proxy = match reqwest::Proxy::all(record.proxy_url()) {
            Ok(proxy) => proxy,
            Err(e) => {
                warn!("Invalid proxy url for {}: {}", record.key, e);
                return ProbeOutcome::Failed;
            }
        };

        let client = match reqwest::Client::builder()
            .proxy(proxy)
            .timeout(Duration::from_secs(self.config.probe_timeout_secs))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                warn!("Failed to build probe client for {}: {}", record.key, e);
                return ProbeOutcome::Failed;
            }
        };

        let started = Instant::now();
        match client.get(&self.config.probe_url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                if response.status().is_success() {
                    ProbeOutcome::Ok(started.elapsed().as_secs_f64() * 1000.0)
                } else if is_ban_status(status) {
                    debug!("Probe through {} got ban status {}", record.key, status);
                    ProbeOutcome::Banned
                } else {
                    ProbeOutcome::Failed
                }
            }
            Err(e) => {
                debug!("Probe through {} failed: {}", record.key, e);
                ProbeOutcome::Failed
            }
        }
    }

    /// 启动定期健康检查任务
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(
                self.config.health_check_interval_secs,
            ));
            interval.tick().await;

            loop {
                interval.tick().await;
                self.run_once().await;
            }
        })
    }
}
