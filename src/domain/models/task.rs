// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::job::JobPlatform;

/// 抓取任务实体
///
/// 表示一个延迟执行的抓取工作单元。搜索任务每次请求生成
/// 新的随机标识；详情任务的标识由 (平台, 职位标识) 确定性
/// 派生，同一职位的重复请求会合并到同一条任务上。
/// 状态转换单调：Pending → Processing → Completed/Failed，
/// 终态写入completed_at后不再变更。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeTask {
    /// 任务唯一标识符
    pub id: Uuid,
    /// 所属订阅者ID
    pub owner_id: Uuid,
    /// 目标平台
    pub platform: JobPlatform,
    /// 操作类型
    pub operation: Operation,
    /// 操作参数
    pub parameters: serde_json::Value,
    /// 任务状态
    pub status: TaskStatus,
    /// 执行结果（完成后写入）
    pub result: Option<serde_json::Value>,
    /// 失败原因（失败后写入）
    pub error: Option<String>,
    /// 创建时间
    pub created_at: DateTime<FixedOffset>,
    /// 最后更新时间
    pub updated_at: DateTime<FixedOffset>,
    /// 完成时间（进入终态时写入）
    pub completed_at: Option<DateTime<FixedOffset>>,
    /// 租约持有者，认领任务的执行器ID
    pub lock_token: Option<Uuid>,
    /// 租约过期时间，超过后任务可被回收重新入队
    pub lock_expires_at: Option<DateTime<FixedOffset>>,
}

/// 操作类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// 职位搜索
    #[default]
    Search,
    /// 职位详情
    Details,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operation::Search => write!(f, "search"),
            Operation::Details => write!(f, "details"),
        }
    }
}

impl FromStr for Operation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search" => Ok(Operation::Search),
            "details" => Ok(Operation::Details),
            _ => Err(()),
        }
    }
}

/// 任务状态枚举
///
/// 状态转换遵循以下流程：
/// Pending → Processing → Completed/Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// 待处理，任务已创建但尚未被认领
    #[default]
    Pending,
    /// 处理中，任务已被某个执行器认领
    Processing,
    /// 已完成
    Completed,
    /// 已失败
    Failed,
}

impl TaskStatus {
    /// 判断是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Processing => write!(f, "processing"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(()),
        }
    }
}

/// 领域错误类型
#[derive(Error, Debug)]
pub enum DomainError {
    /// 无效的状态转换
    #[error("Invalid state transition")]
    InvalidStateTransition,

    /// 验证错误
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ScrapeTask {
    /// 创建一个新的搜索任务
    ///
    /// # 参数
    ///
    /// * `owner_id` - 所属订阅者ID
    /// * `platform` - 目标平台
    /// * `parameters` - 搜索参数
    pub fn new_search(owner_id: Uuid, platform: JobPlatform, parameters: serde_json::Value) -> Self {
        Self::new(Uuid::new_v4(), owner_id, platform, Operation::Search, parameters)
    }

    /// 创建一个新的详情任务
    ///
    /// 任务标识由 (平台, 职位标识) 确定性派生
    pub fn new_details(
        owner_id: Uuid,
        platform: JobPlatform,
        subject_id: &str,
        parameters: serde_json::Value,
    ) -> Self {
        Self::new(
            Self::details_task_id(platform, subject_id),
            owner_id,
            platform,
            Operation::Details,
            parameters,
        )
    }

    fn new(
        id: Uuid,
        owner_id: Uuid,
        platform: JobPlatform,
        operation: Operation,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            id,
            owner_id,
            platform,
            operation,
            parameters,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
            completed_at: None,
            lock_token: None,
            lock_expires_at: None,
        }
    }

    /// 计算详情任务的确定性标识
    ///
    /// 对 "platform:subject_id" 做SHA-256，取前16字节作为UUID，
    /// 使同一职位的重复请求落在同一任务上
    pub fn details_task_id(platform: JobPlatform, subject_id: &str) -> Uuid {
        let mut hasher = Sha256::new();
        hasher.update(platform.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(subject_id.as_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Uuid::from_bytes(bytes)
    }

    /// 启动任务
    ///
    /// 将任务状态从Pending变更为Processing
    pub fn start(mut self) -> Result<Self, DomainError> {
        match self.status {
            TaskStatus::Pending => {
                self.status = TaskStatus::Processing;
                self.updated_at = Utc::now().into();
                Ok(self)
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 完成任务
    ///
    /// 将任务状态从Processing变更为Completed并写入结果
    pub fn complete(mut self, result: serde_json::Value) -> Result<Self, DomainError> {
        match self.status {
            TaskStatus::Processing => {
                self.status = TaskStatus::Completed;
                self.result = Some(result);
                self.completed_at = Some(Utc::now().into());
                self.updated_at = Utc::now().into();
                Ok(self)
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 标记任务失败
    pub fn fail(mut self, error: String) -> Result<Self, DomainError> {
        match self.status {
            TaskStatus::Processing => {
                self.status = TaskStatus::Failed;
                self.error = Some(error);
                self.completed_at = Some(Utc::now().into());
                self.updated_at = Utc::now().into();
                Ok(self)
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 判断任务是否处于终态
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
