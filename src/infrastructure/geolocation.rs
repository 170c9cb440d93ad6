// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 地理提示
///
/// 从自由文本地点解析出的国家/城市/地区代码，
/// 用于偏置代理选择，解析失败时不影响请求继续
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoHint {
    /// 国家代码 (ISO 3166-1 alpha-2)
    pub country: Option<String>,
    /// 城市（规范化小写）
    pub city: Option<String>,
    /// 地区/州代码
    pub region: Option<String>,
}

static NORMALIZE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9, ]+").unwrap());
static SPACES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// 城市 → (国家, 地区)
static CITIES: Lazy<HashMap<&'static str, (&'static str, Option<&'static str>)>> =
    Lazy::new(|| {
        HashMap::from([
            ("new york", ("US", Some("NY"))),
            ("san francisco", ("US", Some("CA"))),
            ("los angeles", ("US", Some("CA"))),
            ("seattle", ("US", Some("WA"))),
            ("austin", ("US", Some("TX"))),
            ("chicago", ("US", Some("IL"))),
            ("boston", ("US", Some("MA"))),
            ("denver", ("US", Some("CO"))),
            ("toronto", ("CA", Some("ON"))),
            ("vancouver", ("CA", Some("BC"))),
            ("london", ("GB", None)),
            ("manchester", ("GB", None)),
            ("dublin", ("IE", None)),
            ("paris", ("FR", None)),
            ("berlin", ("DE", None)),
            ("munich", ("DE", None)),
            ("amsterdam", ("NL", None)),
            ("zurich", ("CH", None)),
            ("stockholm", ("SE", None)),
            ("madrid", ("ES", None)),
            ("barcelona", ("ES", None)),
            ("lisbon", ("PT", None)),
            ("sydney", ("AU", None)),
            ("melbourne", ("AU", None)),
            ("singapore", ("SG", None)),
            ("tokyo", ("JP", None)),
            ("bangalore", ("IN", None)),
            ("bengaluru", ("IN", None)),
            ("sao paulo", ("BR", None)),
        ])
    });

/// 美国州缩写与全称 → 地区代码
static US_STATES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("ca", "CA"),
        ("california", "CA"),
        ("ny", "NY"),
        ("new york", "NY"),
        ("tx", "TX"),
        ("texas", "TX"),
        ("wa", "WA"),
        ("washington", "WA"),
        ("il", "IL"),
        ("illinois", "IL"),
        ("ma", "MA"),
        ("massachusetts", "MA"),
        ("co", "CO"),
        ("colorado", "CO"),
        ("fl", "FL"),
        ("florida", "FL"),
        ("ga", "GA"),
        ("georgia", "GA"),
    ])
});

/// 国家名称与代码 → 国家代码
static COUNTRIES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("us", "US"),
        ("usa", "US"),
        ("united states", "US"),
        ("ca", "CA"),
        ("canada", "CA"),
        ("uk", "GB"),
        ("gb", "GB"),
        ("united kingdom", "GB"),
        ("england", "GB"),
        ("ireland", "IE"),
        ("france", "FR"),
        ("germany", "DE"),
        ("deutschland", "DE"),
        ("netherlands", "NL"),
        ("switzerland", "CH"),
        ("sweden", "SE"),
        ("spain", "ES"),
        ("portugal", "PT"),
        ("australia", "AU"),
        ("singapore", "SG"),
        ("japan", "JP"),
        ("india", "IN"),
        ("brazil", "BR"),
    ])
});

/// 自由文本地点解析器
///
/// 尽力而为：解析失败返回None，调用方应继续执行请求
pub struct LocationResolver;

impl LocationResolver {
    /// 解析自由文本地点
    ///
    /// 依次尝试整串城市匹配、逗号分段的 城市,州/国家 组合、
    /// 以及单独的国家/州名
    pub fn resolve(text: &str) -> Option<GeoHint> {
        let normalized = Self::normalize(text);
        if normalized.is_empty() {
            return None;
        }

        // 整串直接命中城市表
        if let Some((country, region)) = CITIES.get(normalized.as_str()) {
            return Some(GeoHint {
                country: Some(country.to_string()),
                city: Some(normalized),
                region: region.map(|r| r.to_string()),
            });
        }

        let segments: Vec<String> = normalized
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if segments.len() >= 2 {
            let city_part = &segments[0];
            let tail = &segments[segments.len() - 1];

            if let Some((country, region)) = CITIES.get(city_part.as_str()) {
                // 尾段可覆盖城市表给出的州
                let region = US_STATES
                    .get(tail.as_str())
                    .copied()
                    .or(*region)
                    .map(|r| r.to_string());
                return Some(GeoHint {
                    country: Some(country.to_string()),
                    city: Some(city_part.clone()),
                    region,
                });
            }

            if let Some(region) = US_STATES.get(tail.as_str()) {
                return Some(GeoHint {
                    country: Some("US".to_string()),
                    city: Some(city_part.clone()),
                    region: Some(region.to_string()),
                });
            }

            if let Some(country) = COUNTRIES.get(tail.as_str()) {
                return Some(GeoHint {
                    country: Some(country.to_string()),
                    city: Some(city_part.clone()),
                    region: None,
                });
            }
        }

        if let Some(country) = COUNTRIES.get(normalized.as_str()) {
            return Some(GeoHint {
                country: Some(country.to_string()),
                city: None,
                region: None,
            });
        }

        if let Some(region) = US_STATES.get(normalized.as_str()) {
            return Some(GeoHint {
                country: Some("US".to_string()),
                city: None,
                region: Some(region.to_string()),
            });
        }

        None
    }

    fn normalize(text: &str) -> String {
        let lowered = text.to_lowercase();
        let cleaned = NORMALIZE_RE.replace_all(&lowered, "");
        SPACES_RE.replace_all(cleaned.trim(), " ").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_city_with_state_suffix() {
        let hint = LocationResolver::resolve("San Francisco, CA").unwrap();
        assert_eq!(hint.country.as_deref(), Some("US"));
        assert_eq!(hint.city.as_deref(), Some("san francisco"));
        assert_eq!(hint.region.as_deref(), Some("CA"));
    }

    #[test]
    fn test_bare_city() {
        let hint = LocationResolver::resolve("Berlin").unwrap();
        assert_eq!(hint.country.as_deref(), Some("DE"));
    }

    #[test]
    fn test_city_country_pair_with_unknown_city() {
        let hint = LocationResolver::resolve("Heidelberg, Germany").unwrap();
        assert_eq!(hint.country.as_deref(), Some("DE"));
        assert_eq!(hint.city.as_deref(), Some("heidelberg"));
    }

    #[test]
    fn test_bare_country() {
        let hint = LocationResolver::resolve("United Kingdom").unwrap();
        assert_eq!(hint.country.as_deref(), Some("GB"));
        assert!(hint.city.is_none());
    }

    #[test]
    fn test_unknown_location_is_none() {
        assert!(LocationResolver::resolve("Remote").is_none());
        assert!(LocationResolver::resolve("").is_none());
    }

    #[test]
    fn test_normalization_strips_punctuation() {
        let hint = LocationResolver::resolve("  Austin,  TX. ").unwrap();
        assert_eq!(hint.region.as_deref(), Some("TX"));
    }
}
