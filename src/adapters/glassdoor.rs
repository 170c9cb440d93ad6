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

/// Glassdoor职位适配器
pub struct GlassdoorAdapter {
    timeout: Duration,
}

impl GlassdoorAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn search_url(params: &SearchParams) -> String {
        let keywords = params.keywords.join(" ");
        let mut url = format!(
            "https://www.glassdoor.com/Job/jobs.htm?sc.keyword={}",
            urlencoding::encode(&keywords)
        );
        if let Some(location) = &params.location {
            url.push_str(&format!("&locKeyword={}", urlencoding::encode(location)));
        }
        if params.remote == Some(true) {
            url.push_str("&remoteWorkType=1");
        }
        url
    }

    fn details_url(params: &DetailsParams) -> String {
        match &params.url {
            Some(url) => url.clone(),
            None => format!(
                "https://www.glassdoor.com/job-listing/-JV_KO0,0_KE0,0.htm?jl={}",
                params.subject_id
            ),
        }
    }

    fn parse_search(html: &str, limit: Option<u32>) -> Result<Vec<JobPosting>, AdapterError> {
        let document = Html::parse_document(html);
        let card_selector = Selector::parse("li[data-test='jobListing']").unwrap();
        let title_selector = Selector::parse("a[data-test='job-title']").unwrap();
        let company_selector = Selector::parse("span.EmployerProfile_compactEmployerName__9MGcV, div[data-test='employer-name']").unwrap();
        let location_selector = Selector::parse("div[data-test='emp-location']").unwrap();
        let salary_selector = Selector::parse("div[data-test='detailSalary']").unwrap();

        let mut postings = Vec::new();
        for card in document.select(&card_selector) {
            let Some(title_el) = card.select(&title_selector).next() else {
                continue;
            };
            let subject_id = match card.value().attr("data-jobid") {
                Some(id) => id.to_string(),
                None => continue,
            };
            let url = title_el
                .value()
                .attr("href")
                .map(|href| {
                    if href.starts_with("http") {
                        href.to_string()
                    } else {
                        format!("https://www.glassdoor.com{}", href)
                    }
                })
                .unwrap_or_default();

            postings.push(JobPosting {
                platform: JobPlatform::Glassdoor,
                subject_id,
                title: title_el.text().collect::<String>().trim().to_string(),
                company: card
                    .select(&company_selector)
                    .next()
                    .map(|el| el.text().collect::<String>().trim().to_string())
                    .unwrap_or_default(),
                location: card
                    .select(&location_selector)
                    .next()
                    .map(|el| el.text().collect::<String>().trim().to_string()),
                url,
                salary: card
                    .select(&salary_selector)
                    .next()
                    .map(|el| el.text().collect::<String>().trim().to_string()),
                posted_at: None,
            });
        }

        if postings.is_empty() {
            return Err(AdapterError::Extraction(
                "no job cards found in Glassdoor search page".into(),
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
        let title_selector = Selector::parse("h1[data-test='job-title']").unwrap();
        let company_selector = Selector::parse("h4[data-test='employer-name']").unwrap();
        let location_selector = Selector::parse("div[data-test='location']").unwrap();
        let description_selector = Selector::parse("div.JobDetails_jobDescription__uW_fK, div[data-test='jobDescriptionContent']").unwrap();
        let salary_selector = Selector::parse("div[data-test='detailSalary']").unwrap();

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
            platform: JobPlatform::Glassdoor,
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
impl SiteAdapter for GlassdoorAdapter {
    fn platform(&self) -> JobPlatform {
        JobPlatform::Glassdoor
    }

    async fn search(
        &self,
        params: &SearchParams,
        ctx: &FetchContext,
    ) -> Result<Vec<JobPosting>, AdapterError> {
        let url = Self::search_url(params);
        debug!("Glassdoor search: {}", url);
        let html = fetch_html(&url, ctx, self.timeout).await?;
        Self::parse_search(&html, params.limit)
    }

    async fn details(
        &self,
        params: &DetailsParams,
        ctx: &FetchContext,
    ) -> Result<JobDetails, AdapterError> {
        let url = Self::details_url(params);
        debug!("Glassdoor details: {}", url);
        let html = fetch_html(&url, ctx, self.timeout).await?;
        Self::parse_details(&params.subject_id, &url, &html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_FIXTURE: &str = r#"
        <html><body><ul>
        <li data-test="jobListing" data-jobid="1009876543">
            <a data-test="job-title" href="/job-listing/rust-engineer.htm">Rust Engineer</a>
            <div data-test="employer-name">Oxide Labs</div>
            <div data-test="emp-location">Denver, CO</div>
            <div data-test="detailSalary">$140K - $170K</div>
        </li>
        </ul></body></html>"#;

    #[test]
    fn test_parse_search_extracts_cards() {
        let postings = GlassdoorAdapter::parse_search(SEARCH_FIXTURE, None).unwrap();
        assert_eq!(postings.len(), 1);
        let posting = &postings[0];
        assert_eq!(posting.subject_id, "1009876543");
        assert_eq!(posting.title, "Rust Engineer");
        assert_eq!(posting.company, "Oxide Labs");
        assert!(posting.url.starts_with("https://www.glassdoor.com/"));
    }

    #[test]
    fn test_parse_details() {
        let html = r#"
            <html><body>
            <h1 data-test="job-title">Rust Engineer</h1>
            <h4 data-test="employer-name">Oxide Labs</h4>
            <div data-test="location">Denver, CO</div>
            <div data-test="jobDescriptionContent">Build control planes in Rust.</div>
            </body></html>"#;

        let details = GlassdoorAdapter::parse_details("1009876543", "https://example", html).unwrap();
        assert_eq!(details.title, "Rust Engineer");
        assert_eq!(details.description, "Build control planes in Rust.");
    }

    #[test]
    fn test_parse_empty_page_is_extraction_failure() {
        assert!(matches!(
            GlassdoorAdapter::parse_search("<html></html>", None),
            Err(AdapterError::Extraction(_))
        ));
    }
}
