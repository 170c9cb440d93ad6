// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::adapters::fetch::fetch_html;
use crate::adapters::traits::{AdapterError, FetchContext, SiteAdapter};
use crate::domain::models::job::{DetailsParams, JobDetails, JobPlatform, JobPosting, SearchParams};

/// LinkedIn职位适配器
///
/// 使用访客可见的职位搜索页，无需登录会话
pub struct LinkedinAdapter {
    timeout: Duration,
}

impl LinkedinAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn search_url(params: &SearchParams) -> String {
        let mut url = Url::parse("https://www.linkedin.com/jobs/search").unwrap();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("keywords", &params.keywords.join(" "));
            if let Some(location) = &params.location {
                query.append_pair("location", location);
            }
            if params.remote == Some(true) {
                // f_WT=2 为远程职位过滤
                query.append_pair("f_WT", "2");
            }
        }
        url.into()
    }

    fn details_url(params: &DetailsParams) -> String {
        match &params.url {
            Some(url) => url.clone(),
            None => format!("https://www.linkedin.com/jobs/view/{}", params.subject_id),
        }
    }

    /// 从搜索页HTML提取职位卡片
    fn parse_search(html: &str, limit: Option<u32>) -> Result<Vec<JobPosting>, AdapterError> {
        let document = Html::parse_document(html);
        let card_selector = Selector::parse("div.base-card").unwrap();
        let title_selector = Selector::parse("h3.base-search-card__title").unwrap();
        let company_selector = Selector::parse("h4.base-search-card__subtitle").unwrap();
        let location_selector = Selector::parse("span.job-search-card__location").unwrap();
        let link_selector = Selector::parse("a.base-card__full-link").unwrap();

        let mut postings = Vec::new();
        for card in document.select(&card_selector) {
            let title = match card.select(&title_selector).next() {
                Some(el) => el.text().collect::<String>().trim().to_string(),
                None => continue,
            };
            let company = card
                .select(&company_selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .unwrap_or_default();
            let location = card
                .select(&location_selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string());
            let url = card
                .select(&link_selector)
                .next()
                .and_then(|el| el.value().attr("href"))
                .unwrap_or_default()
                .to_string();

            // data-entity-urn="urn:li:jobPosting:4012345678"
            let subject_id = card
                .value()
                .attr("data-entity-urn")
                .and_then(|urn| urn.rsplit(':').next())
                .map(|id| id.to_string())
                .unwrap_or_else(|| url.clone());

            postings.push(JobPosting {
                platform: JobPlatform::Linkedin,
                subject_id,
                title,
                company,
                location,
                url,
                salary: None,
                posted_at: None,
            });
        }

        if postings.is_empty() {
            return Err(AdapterError::Extraction(
                "no job cards found in LinkedIn search page".into(),
            ));
        }

        if let Some(limit) = limit {
            postings.truncate(limit as usize);
        }
        Ok(postings)
    }

    /// 从职位页HTML提取详情
    fn parse_details(
        subject_id: &str,
        url: &str,
        html: &str,
    ) -> Result<JobDetails, AdapterError> {
        let document = Html::parse_document(html);
        let title_selector = Selector::parse("h1.top-card-layout__title").unwrap();
        let company_selector = Selector::parse("a.topcard__org-name-link").unwrap();
        let location_selector = Selector::parse("span.topcard__flavor--bullet").unwrap();
        let description_selector = Selector::parse("div.show-more-less-html__markup").unwrap();
        let type_selector = Selector::parse("span.description__job-criteria-text").unwrap();

        let title = document
            .select(&title_selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .ok_or_else(|| AdapterError::Extraction("missing job title".into()))?;
        let description = document
            .select(&description_selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .ok_or_else(|| AdapterError::Extraction("missing job description".into()))?;

        Ok(JobDetails {
            platform: JobPlatform::Linkedin,
            subject_id: subject_id.to_string(),
            title,
            company: document
                .select(&company_selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .unwrap_or_default(),
            location: document
                .select(&location_selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string()),
            description,
            url: Some(url.to_string()),
            salary: None,
            employment_type: document
                .select(&type_selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string()),
            posted_at: None,
        })
    }
}

#[async_trait]
impl SiteAdapter for LinkedinAdapter {
    fn platform(&self) -> JobPlatform {
        JobPlatform::Linkedin
    }

    async fn search(
        &self,
        params: &SearchParams,
        ctx: &FetchContext,
    ) -> Result<Vec<JobPosting>, AdapterError> {
        let url = Self::search_url(params);
        debug!("LinkedIn search: {}", url);
        let html = fetch_html(&url, ctx, self.timeout).await?;
        Self::parse_search(&html, params.limit)
    }

    async fn details(
        &self,
        params: &DetailsParams,
        ctx: &FetchContext,
    ) -> Result<JobDetails, AdapterError> {
        let url = Self::details_url(params);
        debug!("LinkedIn details: {}", url);
        let html = fetch_html(&url, ctx, self.timeout).await?;
        Self::parse_details(&params.subject_id, &url, &html)
    }
}
