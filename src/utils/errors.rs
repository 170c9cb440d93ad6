// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;

use crate::domain::repositories::task_repository::RepositoryError;

/// 抓取核心错误类型
///
/// 覆盖一次抓取请求从配额检查到结果写入的所有失败情况。
/// 代理池耗尽与配额拒绝发生在任何工作开始之前；
/// 目标封锁与传输失败会对所用代理进行相应惩罚。
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// 代理池耗尽或全部被封禁
    #[error("No proxy available")]
    NoProxyAvailable,

    /// 目标站点的反爬机制已触发
    #[error("Blocked by target site")]
    BlockedByTarget,

    /// 网络层失败（超时、连接错误等）
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// 站点适配器无法解析预期数据
    #[error("Extraction failure: {0}")]
    ExtractionFailure(String),

    /// 当日配额已用尽，请求被拒绝且无副作用
    #[error("Daily quota exceeded for operation '{0}'")]
    QuotaExceeded(String),

    /// 任务不存在
    #[error("Task not found")]
    TaskNotFound,

    /// 任务不属于请求方
    #[error("Unauthorized")]
    Unauthorized,

    /// 请求参数校验失败
    #[error("Validation error: {0}")]
    Validation(String),

    /// 持久化层错误
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}
