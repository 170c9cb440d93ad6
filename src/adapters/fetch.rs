// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::adapters::traits::{AdapterError, FetchContext};
use crate::infrastructure::proxy::health::is_ban_status;

/// 页面中常见的验证挑战标记
const CHALLENGE_MARKERS: [&str; 4] = [
    "captcha-delivery",
    "g-recaptcha",
    "cf-challenge",
    "px-captcha",
];

/// 通过选定代理与轮换身份抓取页面HTML
///
/// 请求前按身份的节奏画像随机延迟。封禁状态码
/// (403/429/503) 与页面内的验证挑战标记都映射为Blocked。
pub async fn fetch_html(
    url: &str,
    ctx: &FetchContext,
    timeout: Duration,
) -> Result<String, AdapterError> {
    let delay = ctx.identity.pacing.sample_delay_ms();
    if delay > 0 {
        sleep(Duration::from_millis(delay)).await;
    }

    let proxy = reqwest::Proxy::all(ctx.proxy.proxy_url())
        .map_err(|e| AdapterError::Transport(format!("invalid proxy url: {}", e)))?;

    let client = reqwest::Client::builder()
        .proxy(proxy)
        .user_agent(ctx.identity.user_agent.clone())
        .cookie_store(true)
        .timeout(timeout)
        .build()?;

    debug!("Fetching {} via proxy {}", url, ctx.proxy.key);

    let response = client
        .get(url)
        .header("Accept-Language", ctx.identity.accept_language.clone())
        .header(
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        )
        .send()
        .await?;

    let status = response.status().as_u16();
    if is_ban_status(status) {
        return Err(AdapterError::Blocked {
            status: Some(status),
        });
    }
    if !response.status().is_success() {
        return Err(AdapterError::Transport(format!(
            "unexpected status {}",
            status
        )));
    }

    let body = response.text().await?;
    if has_challenge_marker(&body) {
        return Err(AdapterError::Blocked { status: None });
    }

    Ok(body)
}

/// 判断页面是否为验证挑战页
pub fn has_challenge_marker(html: &str) -> bool {
    // 截断点可能落在多字节字符中间，此时退回整页扫描
    let probe_window = html.get(..html.len().min(16 * 1024)).unwrap_or(html);
    CHALLENGE_MARKERS
        .iter()
        .any(|marker| probe_window.contains(marker))
}
