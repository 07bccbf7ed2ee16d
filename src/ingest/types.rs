// src/ingest/types.rs
use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One RSS/Atom endpoint in the static feed registry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedDescriptor {
    pub url: String,
    /// Human-readable publisher name, e.g. "CoinDesk".
    pub source: String,
    /// Default topic when classification finds no keyword match.
    pub category: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
}

/// Fields extracted from one `<item>`/`<entry>` block, before normalization.
/// A fragment without an extractable title never becomes a `RawFeedItem`.
#[derive(Debug, Clone, Default)]
pub struct RawFeedItem {
    pub title: String,
    pub summary: Option<String>,
    pub link: Option<String>,
    pub guid: Option<String>,
    pub published: Option<String>,
}

/// Canonical record for one classified news story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub title: String,
    pub summary: String,
    /// `"#"` sentinel means "no usable link".
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub source: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
}

/// Output of one aggregation run: deduplicated, newest-first, capped.
#[derive(Debug, Clone)]
pub struct AggregatedResult {
    pub items: Vec<NewsItem>,
    /// Items per category; within each list items keep the global recency order.
    pub categorized: BTreeMap<String, Vec<NewsItem>>,
    /// Distinct `source` values observed in `items`, in first-appearance order.
    pub sources: Vec<String>,
    /// Distinct category keys of `categorized`.
    pub categories: Vec<String>,
    pub last_updated: DateTime<Utc>,
    pub processing_time_ms: u64,
}

/// Transport seam between the fetcher and the network, so retry/parse logic
/// can be exercised against fixtures without opening sockets.
#[async_trait::async_trait]
pub trait FeedTransport: Send + Sync {
    /// Returns the response body for `url`, or an error for any transport
    /// failure (network error, timeout, non-2xx status).
    async fn get(&self, url: &str) -> Result<String>;
}
