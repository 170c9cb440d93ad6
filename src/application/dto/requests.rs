// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::models::job::{DetailsParams, SearchParams};

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct SearchRequestDto {
    #[validate(length(min = 1, message = "Keywords cannot be empty"))]
    pub keywords: Vec<String>,
    pub location: Option<String>,
    pub remote: Option<bool>,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<u32>,
}

impl SearchRequestDto {
    /// 转换为领域搜索参数
    pub fn into_params(self) -> SearchParams {
        SearchParams {
            keywords: self.keywords,
            location: self.location,
            remote: self.remote,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct DetailsRequestDto {
    #[validate(length(min = 1, message = "Subject id cannot be empty"))]
    pub subject_id: String,
    #[validate(url)]
    pub url: Option<String>,
}

impl DetailsRequestDto {
    /// 转换为领域详情参数
    pub fn into_params(self) -> DetailsParams {
        DetailsParams {
            subject_id: self.subject_id,
            url: self.url,
        }
    }
}
