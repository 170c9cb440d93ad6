// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use rand::seq::IndexedRandom;
use rand::Rng;

use crate::domain::models::job::JobPlatform;

/// 请求节奏画像
///
/// 请求前的随机延迟区间（毫秒），模拟人工浏览节奏
#[derive(Debug, Clone, Copy)]
pub struct PacingProfile {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl PacingProfile {
    /// 采样一次请求前延迟
    pub fn sample_delay_ms(&self) -> u64 {
        if self.max_delay_ms <= self.min_delay_ms {
            return self.min_delay_ms;
        }
        rand::rng().random_range(self.min_delay_ms..=self.max_delay_ms)
    }
}

/// 客户端身份
///
/// 每次抓取会话轮换一套新的身份
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    /// User-Agent请求头
    pub user_agent: String,
    /// Accept-Language请求头
    pub accept_language: String,
    /// 请求节奏画像
    pub pacing: PacingProfile,
}

static DESKTOP_USER_AGENTS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
    ]
});

static ACCEPT_LANGUAGES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "en-US,en;q=0.9",
        "en-US,en;q=0.8",
        "en-GB,en;q=0.9,en-US;q=0.8",
    ]
});

/// 客户端身份轮换器
///
/// 目标平台提示只影响节奏画像：防爬越激进的平台
/// 节奏放得越慢
pub struct IdentityRotator;

impl IdentityRotator {
    pub fn new() -> Self {
        Self
    }

    /// 为目标平台轮换一套新身份
    pub fn rotate(&self, platform: JobPlatform) -> ClientIdentity {
        let mut rng = rand::rng();
        let user_agent = DESKTOP_USER_AGENTS
            .choose(&mut rng)
            .copied()
            .unwrap_or(DESKTOP_USER_AGENTS[0])
            .to_string();
        let accept_language = ACCEPT_LANGUAGES
            .choose(&mut rng)
            .copied()
            .unwrap_or(ACCEPT_LANGUAGES[0])
            .to_string();

        let pacing = match platform {
            // LinkedIn对自动化最敏感
            JobPlatform::Linkedin => PacingProfile {
                min_delay_ms: 800,
                max_delay_ms: 2500,
            },
            JobPlatform::Glassdoor => PacingProfile {
                min_delay_ms: 500,
                max_delay_ms: 1800,
            },
            JobPlatform::Indeed => PacingProfile {
                min_delay_ms: 300,
                max_delay_ms: 1200,
            },
        };

        ClientIdentity {
            user_agent,
            accept_language,
            pacing,
        }
    }
}

impl Default for IdentityRotator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_yields_known_user_agent() {
        let rotator = IdentityRotator::new();
        for platform in JobPlatform::ALL {
            let identity = rotator.rotate(platform);
            assert!(DESKTOP_USER_AGENTS.contains(&identity.user_agent.as_str()));
            assert!(!identity.accept_language.is_empty());
        }
    }

    #[test]
    fn test_pacing_sample_stays_in_bounds() {
        let pacing = PacingProfile {
            min_delay_ms: 100,
            max_delay_ms: 200,
        };
        for _ in 0..50 {
            let delay = pacing.sample_delay_ms();
            assert!((100..=200).contains(&delay));
        }
    }

    #[test]
    fn test_linkedin_pacing_is_slowest() {
        let rotator = IdentityRotator::new();
        let linkedin = rotator.rotate(JobPlatform::Linkedin);
        let indeed = rotator.rotate(JobPlatform::Indeed);
        assert!(linkedin.pacing.min_delay_ms > indeed.pacing.min_delay_ms);
    }
}
