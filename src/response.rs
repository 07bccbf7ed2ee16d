// src/response.rs
//! External payload assembly. Both outcomes serialize to the same envelope
//! and are served as HTTP 200; callers distinguish them via `success`.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::types::{AggregatedResult, NewsItem};

/// Advisory freshness window advertised via Cache-Control on success.
pub const CACHE_MAX_AGE_SECS: i64 = 300;
/// `cacheExpiry` is stamped this far in the future on success.
pub const CACHE_EXPIRY_SECS: i64 = 600;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsResponse {
    pub success: bool,
    /// Flat, deduplicated, newest-first, capped item list.
    pub data: Vec<NewsItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categorized: Option<BTreeMap<String, Vec<NewsItem>>>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    pub last_updated: DateTime<Utc>,
    pub processing_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_expiry: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn success(result: AggregatedResult) -> NewsResponse {
    NewsResponse {
        success: true,
        count: result.items.len(),
        data: result.items,
        categorized: Some(result.categorized),
        sources: Some(result.sources),
        categories: Some(result.categories),
        last_updated: result.last_updated,
        processing_time_ms: result.processing_time_ms,
        cache_expiry: Some(Utc::now() + Duration::seconds(CACHE_EXPIRY_SECS)),
        error: None,
    }
}

/// Fixed placeholder items served when the pipeline fails catastrophically.
fn fallback_items(now: DateTime<Utc>) -> Vec<NewsItem> {
    vec![
        NewsItem {
            title: "Markets hold steady as investors await fresh economic data".to_string(),
            summary: "Live coverage is temporarily unavailable. Headlines will refresh \
                      automatically once news feeds recover."
                .to_string(),
            url: "#".to_string(),
            published_at: now,
            source: "Newsroom".to_string(),
            category: "Markets".to_string(),
            region: None,
            sector: None,
        },
        NewsItem {
            title: "Crypto assets trade in a narrow range".to_string(),
            summary: "Live coverage is temporarily unavailable. Headlines will refresh \
                      automatically once news feeds recover."
                .to_string(),
            url: "#".to_string(),
            published_at: now,
            source: "Newsroom".to_string(),
            category: "Crypto".to_string(),
            region: None,
            sector: None,
        },
    ]
}

pub fn fallback(error: impl Into<String>) -> NewsResponse {
    let now = Utc::now();
    let data = fallback_items(now);
    NewsResponse {
        success: false,
        count: data.len(),
        data,
        categorized: None,
        sources: None,
        categories: None,
        last_updated: now,
        processing_time_ms: 0,
        cache_expiry: None,
        error: Some(error.into()),
    }
}
