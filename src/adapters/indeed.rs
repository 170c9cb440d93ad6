// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;

use crate::adapters::fetch::fetch_html;
use crate::adapters::traits::{AdapterError, FetchContext, SiteAdapter};
use crate::domain::models::job::{DetailsParams, JobDetails, JobPlatform, JobPosting, SearchParams};

/// Indeed职位适配器
pub struct IndeedAdapter {
    timeout: Duration,
}

impl IndeedAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn search_url(params: &SearchParams) -> String {
        let mut keywords = params.keywords.join(" ");
        if params.remote == Some(true) {
            keywords.push_str(" remote");
        }
        let mut url = format!(
            "https://www.indeed.com/jobs?q={}",
            urlencoding::encode(&keywords)
        );
        if let Some(location) = &params.location {
            url.push_str(&format!("&l={}", urlencoding::encode(location)));
        }
        url
    }

    fn details_url(params: &DetailsParams) -> String {
        match &params.url {
            Some(url) => url.clone(),
            None => format!("https://www.indeed.com/viewjob?jk={}", params.subject_id),
        }
    }

    fn parse_search(html: &str, limit: Option<u32>) -> Result<Vec<JobPosting>, AdapterError> {
        let document = Html::parse_document(html);
        let card_selector = Selector::parse("div.job_seen_beacon").unwrap();
        let link_selector = Selector::parse("a.jcs-JobTitle").unwrap();
        let title_selector = Selector::parse("span[title]").unwrap();
        let company_selector = Selector::parse("span[data-testid='company-name']").unwrap();
        let location_selector = Selector::parse("div[data-testid='text-location']").unwrap();
        let salary_selector = Selector::parse("div.salary-snippet-container").unwrap();

        let mut postings = Vec::new();
        for card in document.select(&card_selector) {
            let Some(link) = card.select(&link_selector).next() else {
                continue;
            };
            // data-jk 为职位键
            let subject_id = match link.value().attr("data-jk") {
                Some(id) => id.to_string(),
                None => continue,
            };
            let title = link
                .select(&title_selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .unwrap_or_else(|| link.text().collect::<String>().trim().to_string());

            postings.push(JobPosting {
                platform: JobPlatform::Indeed,
                subject_id: subject_id.clone(),
                title,
                company: card
                    .select(&company_selector)
                    .next()
                    .map(|el| el.text().collect::<String>().trim().to_string())
                    .unwrap_or_default(),
                location: card
                    .select(&location_selector)
                    .next()
                    .map(|el| el.text().collect::<String>().trim().to_string()),
                url: format!("https://www.indeed.com/viewjob?jk={}", subject_id),
                salary: card
                    .select(&salary_selector)
                    .next()
                    .map(|el| el.text().collect::<String>().trim().to_string()),
                posted_at: None,
            });
        }

        if postings.is_empty() {
            return Err(AdapterError::Extraction(
                "no job cards found in Indeed search page".into(),
            ));
        }

        if let Some(limit) = limit {
            postings.truncate(limit as usize);
        }
        Ok(postings)
    }

    fn parse_details(
        subject_id: &str,
        url: &str,
        html: &str,
    ) -> Result<JobDetails, AdapterError> {
        let document = Html::parse_document(html);
        let title_selector = Selector::parse("h1.jobsearch-JobInfoHeader-title").unwrap();
        let company_selector = Selector::parse("div[data-testid='inlineHeader-companyName']").unwrap();
        let location_selector =
            Selector::parse("div[data-testid='inlineHeader-companyLocation']").unwrap();
        let description_selector = Selector::parse("div#jobDescriptionText").unwrap();
        let salary_selector = Selector::parse("div#salaryInfoAndJobType span").unwrap();

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
            platform: JobPlatform::Indeed,
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
            salary: document
                .select(&salary_selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string()),
            employment_type: None,
            posted_at: None,
        })
    }
}

#[async_trait]
impl SiteAdapter for IndeedAdapter {
    fn platform(&self) -> JobPlatform {
        JobPlatform::Indeed
    }

    async fn search(
        &self,
        params: &SearchParams,
        ctx: &FetchContext,
    ) -> Result<Vec<JobPosting>, AdapterError> {
        let url = Self::search_url(params);
        debug!("Indeed search: {}", url);
        let html = fetch_html(&url, ctx, self.timeout).await?;
        Self::parse_search(&html, params.limit)
    }

    async fn details(
        &self,
        params: &DetailsParams,
        ctx: &FetchContext,
    ) -> Result<JobDetails, AdapterError> {
        let url = Self::details_url(params);
        debug!("Indeed details: {}", url);
        let html = fetch_html(&url, ctx, self.timeout).await?;
        Self::parse_details(&params.subject_id, &url, &html)
    }
}
