// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::time::Duration;

use crate::adapters::glassdoor::GlassdoorAdapter;
use crate::adapters::indeed::IndeedAdapter;
use crate::adapters::linkedin::LinkedinAdapter;
use crate::adapters::traits::{AdapterError, AdapterRouter, FetchContext, SiteAdapter};
use crate::config::settings::AdapterSettings;
use crate::domain::models::job::{DetailsParams, JobDetails, JobPlatform, JobPosting, SearchParams};

/// 平台适配器路由
///
/// 平台集合固定且编译期已知，按标签分发到具体适配器，
/// 不做开放式注册
pub struct PlatformRouter {
    linkedin: LinkedinAdapter,
    indeed: IndeedAdapter,
    glassdoor: GlassdoorAdapter,
}

impl PlatformRouter {
    /// 创建新的平台路由
    pub fn new(settings: &AdapterSettings) -> Self {
        let timeout = Duration::from_secs(settings.request_timeout_secs);
        Self {
            linkedin: LinkedinAdapter::new(timeout),
            indeed: IndeedAdapter::new(timeout),
            glassdoor: GlassdoorAdapter::new(timeout),
        }
    }

    fn adapter(&self, platform: JobPlatform) -> &dyn SiteAdapter {
        match platform {
            JobPlatform::Linkedin => &self.linkedin,
            JobPlatform::Indeed => &self.indeed,
            JobPlatform::Glassdoor => &self.glassdoor,
        }
    }
}

#[async_trait]
impl AdapterRouter for PlatformRouter {
    async fn search(
        &self,
        platform: JobPlatform,
        params: &SearchParams,
        ctx: &FetchContext,
    ) -> Result<Vec<JobPosting>, AdapterError> {
        self.adapter(platform).search(params, ctx).await
    }

    async fn details(
        &self,
        platform: JobPlatform,
        params: &DetailsParams,
        ctx: &FetchContext,
    ) -> Result<JobDetails, AdapterError> {
        self.adapter(platform).details(params, ctx).await
    }
}
