// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use thiserror::Error;

use crate::adapters::identity::ClientIdentity;
use crate::domain::models::job::{DetailsParams, JobDetails, JobPlatform, JobPosting, SearchParams};
use crate::domain::models::proxy::ProxyRecord;

/// 适配器错误类型
///
/// Blocked与一般传输失败必须可区分：前者会使所用代理
/// 被记为封禁信号，后者只做轻度惩罚。
#[derive(Error, Debug)]
pub enum AdapterError {
    /// 目标站点的反爬机制已触发（HTTP 403/429/503 或验证挑战）
    #[error("Blocked by target (status {status:?})")]
    Blocked { status: Option<u16> },

    /// 传输层失败（超时、连接错误）
    #[error("Transport error: {0}")]
    Transport(String),

    /// 页面结构不符合预期，提取失败
    #[error("Extraction error: {0}")]
    Extraction(String),
}

impl From<reqwest::Error> for AdapterError {
    fn from(e: reqwest::Error) -> Self {
        AdapterError::Transport(e.to_string())
    }
}

impl AdapterError {
    /// 是否为封锁信号
    pub fn is_blocked(&self) -> bool {
        matches!(self, AdapterError::Blocked { .. })
    }
}

/// 单次抓取的执行上下文
///
/// 选定的出口端点加上一套新轮换的客户端身份
#[derive(Debug, Clone)]
pub struct FetchContext {
    /// 本次请求使用的代理
    pub proxy: ProxyRecord,
    /// 本次请求使用的客户端身份
    pub identity: ClientIdentity,
}

/// 站点适配器特质
///
/// 每个受支持的平台实现一个适配器，负责该平台的
/// URL构造与DOM提取
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    /// 适配器对应的平台
    fn platform(&self) -> JobPlatform;

    /// 职位搜索
    async fn search(
        &self,
        params: &SearchParams,
        ctx: &FetchContext,
    ) -> Result<Vec<JobPosting>, AdapterError>;

    /// 职位详情
    async fn details(
        &self,
        params: &DetailsParams,
        ctx: &FetchContext,
    ) -> Result<JobDetails, AdapterError>;
}

/// 适配器路由特质
///
/// 编排器通过该接口按平台分发请求；生产实现为固定
/// 平台集合上的标签化分发
#[async_trait]
pub trait AdapterRouter: Send + Sync {
    /// 路由搜索请求
    async fn search(
        &self,
        platform: JobPlatform,
        params: &SearchParams,
        ctx: &FetchContext,
    ) -> Result<Vec<JobPosting>, AdapterError>;

    /// 路由详情请求
    async fn details(
        &self,
        platform: JobPlatform,
        params: &DetailsParams,
        ctx: &FetchContext,
    ) -> Result<JobDetails, AdapterError>;
}
