// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use base64::Engine;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::settings::{ProviderSettings, StaticEndpointSettings};
use crate::domain::models::proxy::{
    ProxyCredentials, ProxyGeo, ProxyKey, ProxyRecord, ProxyTransport,
};

/// 提供商错误类型
#[derive(Error, Debug)]
pub enum ProviderError {
    /// HTTP请求失败
    #[error("Provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// 响应解析失败
    #[error("Provider response parse error: {0}")]
    Parse(String),
    /// 提供商配置不完整
    #[error("Provider misconfigured: {0}")]
    Misconfigured(String),
}

/// 代理提供商特质
///
/// 每个提供商独立拉取候选端点；单个提供商的失败
/// 不得阻塞其它提供商的同步。
#[async_trait]
pub trait ProxyProvider: Send + Sync {
    /// 提供商标识
    fn name(&self) -> &str;

    /// 拉取当前可用的端点列表
    async fn fetch(&self) -> Result<Vec<ProxyRecord>, ProviderError>;
}

/// 静态配置提供商
///
/// 端点直接来自配置文件，fetch不产生网络请求
pub struct StaticListProvider {
    name: String,
    endpoints: Vec<StaticEndpointSettings>,
}

impl StaticListProvider {
    pub fn new(name: String, endpoints: Vec<StaticEndpointSettings>) -> Self {
        Self { name, endpoints }
    }
}

#[async_trait]
impl ProxyProvider for StaticListProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<ProxyRecord>, ProviderError> {
        let records = self
            .endpoints
            .iter()
            .map(|e| endpoint_to_record(&self.name, e))
            .collect();
        Ok(records)
    }
}

/// 提供商API返回的端点条目
#[derive(Debug, Deserialize)]
struct ProviderEndpointDto {
    host: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
    protocol: Option<String>,
    country: Option<String>,
    city: Option<String>,
    region: Option<String>,
    #[serde(default)]
    residential: bool,
}

/// HTTP JSON API提供商
///
/// 向提供商API拉取JSON端点列表，支持HTTP基本认证，
/// 网络错误按指数退避重试
pub struct HttpApiProvider {
    name: String,
    api_url: String,
    auth_header: Option<String>,
    client: reqwest::Client,
}

impl HttpApiProvider {
    pub fn new(
        name: String,
        api_url: String,
        api_username: Option<String>,
        api_password: Option<String>,
    ) -> Self {
        let auth_header = api_username.map(|user| {
            let pass = api_password.unwrap_or_default();
            let encoded =
                base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user, pass));
            format!("Basic {}", encoded)
        });

        Self {
            name,
            api_url,
            auth_header,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    async fn fetch_once(&self) -> Result<Vec<ProviderEndpointDto>, ProviderError> {
        let mut request = self.client.get(&self.api_url);
        if let Some(auth) = &self.auth_header {
            request = request.header("Authorization", auth.clone());
        }

        let response = request.send().await?.error_for_status()?;
        let endpoints: Vec<ProviderEndpointDto> = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(endpoints)
    }
}

#[async_trait]
impl ProxyProvider for HttpApiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<ProxyRecord>, ProviderError> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..Default::default()
        };

        let endpoints = backoff::future::retry(policy, || async {
            self.fetch_once().await.map_err(|e| match e {
                // 网络错误重试，解析/配置错误直接失败
                ProviderError::Http(_) => {
                    warn!("Provider '{}' fetch failed, retrying: {}", self.name, e);
                    backoff::Error::transient(e)
                }
                other => backoff::Error::permanent(other),
            })
        })
        .await?;

        debug!(
            "Provider '{}' returned {} endpoints",
            self.name,
            endpoints.len()
        );

        let records = endpoints
            .into_iter()
            .map(|dto| {
                let credentials = dto.username.map(|username| ProxyCredentials {
                    username,
                    password: dto.password.unwrap_or_default(),
                });
                ProxyRecord::new(
                    ProxyKey {
                        provider: self.name.clone(),
                        host: dto.host,
                        port: dto.port,
                    },
                    credentials,
                    dto.protocol
                        .as_deref()
                        .and_then(|p| ProxyTransport::from_str(p).ok())
                        .unwrap_or_default(),
                    ProxyGeo {
                        country: dto.country,
                        city: dto.city,
                        region: dto.region,
                    },
                    dto.residential,
                )
            })
            .collect();

        Ok(records)
    }
}

fn endpoint_to_record(provider: &str, endpoint: &StaticEndpointSettings) -> ProxyRecord {
    let credentials = endpoint.username.clone().map(|username| ProxyCredentials {
        username,
        password: endpoint.password.clone().unwrap_or_default(),
    });

    ProxyRecord::new(
        ProxyKey {
            provider: provider.to_string(),
            host: endpoint.host.clone(),
            port: endpoint.port,
        },
        credentials,
        endpoint
            .protocol
            .as_deref()
            .and_then(|p| ProxyTransport::from_str(p).ok())
            .unwrap_or_default(),
        ProxyGeo {
            country: endpoint.country.clone(),
            city: endpoint.city.clone(),
            region: endpoint.region.clone(),
        },
        endpoint.residential,
    )
}

/// 根据配置构建提供商实例
pub fn provider_from_settings(
    settings: &ProviderSettings,
) -> Result<Arc<dyn ProxyProvider>, ProviderError> {
    if let Some(api_url) = &settings.api_url {
        return Ok(Arc::new(HttpApiProvider::new(
            settings.name.clone(),
            api_url.clone(),
            settings.api_username.clone(),
            settings.api_password.clone(),
        )));
    }

    if !settings.endpoints.is_empty() {
        return Ok(Arc::new(StaticListProvider::new(
            settings.name.clone(),
            settings.endpoints.clone(),
        )));
    }

    Err(ProviderError::Misconfigured(format!(
        "provider '{}' has neither api_url nor endpoints",
        settings.name
    )))
}
