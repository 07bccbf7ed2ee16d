// src/ingest/fetcher.rs
//! Per-feed retrieval and parsing. A feed that fails all attempts contributes
//! zero items; nothing here errors out of the pipeline.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::classify::ClassifierHandle;
use crate::ingest::parser;
use crate::ingest::types::{FeedDescriptor, FeedTransport, NewsItem, RawFeedItem};

/// Per-request timeout; the in-flight request is aborted when it elapses.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);
/// Total attempts per feed, including the first.
pub const FETCH_ATTEMPTS: usize = 2;
/// Fixed backoff between attempts.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(1);
/// At most this many fragments are parsed per feed, bounding per-feed cost.
pub const MAX_ITEMS_PER_FEED: usize = 15;

const USER_AGENT: &str = "market-news-aggregator/0.1";

/// Production transport: shared reqwest client with the timeout baked in.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedTransport for HttpTransport {
    async fn get(&self, url: &str) -> Result<String> {
        let resp = self.client.get(url).send().await.context("feed http get")?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("feed responded with status {status}");
        }
        resp.text().await.context("feed http body")
    }
}

/// Fetch and parse one feed. Transport failures are retried up to
/// [`FETCH_ATTEMPTS`]; exhausting the budget degrades to an empty result.
pub async fn fetch_feed(
    transport: &dyn FeedTransport,
    feed: &FeedDescriptor,
    classifier: &ClassifierHandle,
) -> Vec<NewsItem> {
    let body = match fetch_with_retry(transport, feed).await {
        Some(body) => body,
        None => return Vec::new(),
    };

    let t0 = Instant::now();
    let raw = parse_feed_body(&body, MAX_ITEMS_PER_FEED);
    let items: Vec<NewsItem> = raw
        .into_iter()
        .filter_map(|r| build_item(feed, r, classifier))
        .collect();

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("feed_parse_ms").record(ms);
    counter!("feed_items_total").increment(items.len() as u64);
    debug!(
        source = %feed.source,
        bytes = body.len(),
        items = items.len(),
        "parsed feed"
    );

    items
}

async fn fetch_with_retry(transport: &dyn FeedTransport, feed: &FeedDescriptor) -> Option<String> {
    for attempt in 1..=FETCH_ATTEMPTS {
        match transport.get(&feed.url).await {
            Ok(body) => {
                debug!(source = %feed.source, attempt, bytes = body.len(), "feed fetched");
                return Some(body);
            }
            Err(e) => {
                warn!(error = ?e, source = %feed.source, attempt, "feed fetch failed");
                counter!("feed_fetch_errors_total").increment(1);
                if attempt < FETCH_ATTEMPTS {
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
            }
        }
    }
    None
}

/* ----------------------------
Document parsing
---------------------------- */

// Strict shapes for well-formed documents.

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    guid: Option<Guid>,
}

#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "$text")]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<String>,
    #[serde(rename = "link", default)]
    link: Vec<AtomLink>,
    summary: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
}

/// Parse a feed document into at most `cap` raw items.
///
/// Well-formed RSS and Atom go through quick-xml; anything the strict parser
/// rejects falls back to pattern-matched `<item>` fragments, then `<entry>`
/// fragments. Title-less items are dropped in every path.
pub fn parse_feed_body(body: &str, cap: usize) -> Vec<RawFeedItem> {
    let scrubbed = scrub_entities_for_xml(body);

    if let Ok(rss) = from_str::<Rss>(&scrubbed) {
        if !rss.channel.item.is_empty() {
            return rss
                .channel
                .item
                .into_iter()
                .take(cap)
                .filter_map(raw_from_rss)
                .collect();
        }
    }

    if let Ok(feed) = from_str::<AtomFeed>(&scrubbed) {
        if !feed.entry.is_empty() {
            return feed
                .entry
                .into_iter()
                .take(cap)
                .filter_map(raw_from_atom)
                .collect();
        }
    }

    let mut fragments = extract_fragments(body, item_block_re());
    if fragments.is_empty() {
        fragments = extract_fragments(body, entry_block_re());
    }
    fragments
        .into_iter()
        .take(cap)
        .filter_map(|f| parser::parse_fragment(f))
        .collect()
}

fn raw_from_rss(it: RssItem) -> Option<RawFeedItem> {
    let title = it.title.filter(|t| !t.trim().is_empty())?;
    Some(RawFeedItem {
        title,
        summary: it.description,
        link: it.link,
        guid: it.guid.and_then(|g| g.value),
        published: it.pub_date,
    })
}

fn raw_from_atom(entry: AtomEntry) -> Option<RawFeedItem> {
    let title = entry.title.filter(|t| !t.trim().is_empty())?;
    Some(RawFeedItem {
        title,
        summary: entry.summary,
        link: entry.link.into_iter().find_map(|l| l.href),
        guid: entry.id,
        published: entry.published.or(entry.updated),
    })
}

fn item_block_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)<item(?:\s[^>]*)?>(.*?)</item>").expect("item regex"))
}

fn entry_block_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)<entry(?:\s[^>]*)?>(.*?)</entry>").expect("entry regex"))
}

fn extract_fragments<'a>(body: &'a str, re: &Regex) -> Vec<&'a str> {
    re.captures_iter(body)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// quick-xml rejects HTML entities that XML does not declare; feeds use them
/// anyway. Replace the common ones before the strict parse.
fn scrub_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

/// Normalize one raw item against its owning feed: clean the title, bound the
/// summary, resolve the url, parse the timestamp, classify.
pub fn build_item(
    feed: &FeedDescriptor,
    raw: RawFeedItem,
    classifier: &ClassifierHandle,
) -> Option<NewsItem> {
    let title = parser::clean_text(&raw.title);
    if title.is_empty() {
        return None;
    }

    let summary = parser::summarize(raw.summary.as_deref().unwrap_or_default());
    let url = parser::resolve_url(raw.link.as_deref(), raw.guid.as_deref());
    let published_at = parser::parse_pub_date(raw.published.as_deref());

    let classification = classifier.classify(&title, &summary, Some(&feed.category));
    let region = classification.region.or_else(|| feed.region.clone());
    let sector = classification.sector.or_else(|| feed.sector.clone());

    Some(NewsItem {
        title,
        summary,
        url,
        published_at,
        source: feed.source.clone(),
        category: classification.category,
        region,
        sector,
    })
}
