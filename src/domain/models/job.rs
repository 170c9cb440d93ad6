// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 支持的职位平台
///
/// 平台集合在编译期固定，适配器按标签分发而非开放式多态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobPlatform {
    /// LinkedIn职位
    #[default]
    Linkedin,
    /// Indeed职位
    Indeed,
    /// Glassdoor职位
    Glassdoor,
}

impl JobPlatform {
    /// 所有受支持的平台
    pub const ALL: [JobPlatform; 3] = [
        JobPlatform::Linkedin,
        JobPlatform::Indeed,
        JobPlatform::Glassdoor,
    ];
}

impl fmt::Display for JobPlatform {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobPlatform::Linkedin => write!(f, "linkedin"),
            JobPlatform::Indeed => write!(f, "indeed"),
            JobPlatform::Glassdoor => write!(f, "glassdoor"),
        }
    }
}

impl FromStr for JobPlatform {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linkedin" => Ok(JobPlatform::Linkedin),
            "indeed" => Ok(JobPlatform::Indeed),
            "glassdoor" => Ok(JobPlatform::Glassdoor),
            _ => Err(()),
        }
    }
}

/// 职位搜索参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    /// 搜索关键词
    pub keywords: Vec<String>,
    /// 自由文本地点，例如 "San Francisco, CA"
    pub location: Option<String>,
    /// 是否仅限远程职位
    pub remote: Option<bool>,
    /// 期望结果数量
    pub limit: Option<u32>,
}

/// 职位详情请求参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailsParams {
    /// 平台侧职位标识
    pub subject_id: String,
    /// 已知的职位页URL（可选）
    pub url: Option<String>,
}

/// 搜索结果中的单个职位条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPosting {
    /// 来源平台
    pub platform: JobPlatform,
    /// 平台侧职位标识
    pub subject_id: String,
    /// 职位标题
    pub title: String,
    /// 公司名称
    pub company: String,
    /// 工作地点
    pub location: Option<String>,
    /// 职位页URL
    pub url: String,
    /// 薪资信息（原始文本）
    pub salary: Option<String>,
    /// 发布时间
    pub posted_at: Option<DateTime<Utc>>,
}

/// 职位详情
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDetails {
    /// 来源平台
    pub platform: JobPlatform,
    /// 平台侧职位标识
    pub subject_id: String,
    /// 职位标题
    pub title: String,
    /// 公司名称
    pub company: String,
    /// 工作地点
    pub location: Option<String>,
    /// 职位描述正文
    pub description: String,
    /// 职位页URL
    pub url: Option<String>,
    /// 薪资信息（原始文本）
    pub salary: Option<String>,
    /// 雇佣类型
    pub employment_type: Option<String>,
    /// 发布时间
    pub posted_at: Option<DateTime<Utc>>,
}
