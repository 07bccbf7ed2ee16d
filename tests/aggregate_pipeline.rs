// tests/aggregate_pipeline.rs
//
// End-to-end pipeline runs against fixture feeds through a mock transport:
// merge, dedup, sort, cap, group, and source/category derivation.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use market_news_aggregator::classify::{
    ClassifierEngine, ClassifierHandle, DEFAULT_CLASSIFIER_CONFIG,
};
use market_news_aggregator::ingest::types::{FeedDescriptor, FeedTransport};
use market_news_aggregator::ingest::{self, MAX_ITEMS};

const MARKET_RSS: &str = include_str!("fixtures/market_rss.xml");
const CRYPTO_RSS: &str = include_str!("fixtures/crypto_rss.xml");
const CRYPTO_ALT_RSS: &str = include_str!("fixtures/crypto_alt_rss.xml");
const TECH_ATOM: &str = include_str!("fixtures/tech_atom.xml");
const ENERGY_MALFORMED: &str = include_str!("fixtures/energy_malformed.xml");

struct MockTransport {
    bodies: HashMap<String, String>,
}

impl MockTransport {
    fn new(pairs: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            bodies: pairs
                .iter()
                .map(|(url, body)| (url.to_string(), body.to_string()))
                .collect(),
        })
    }
}

#[async_trait]
impl FeedTransport for MockTransport {
    async fn get(&self, url: &str) -> Result<String> {
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("connection refused: {url}"))
    }
}

fn feed(url: &str, source: &str, category: &str) -> FeedDescriptor {
    FeedDescriptor {
        url: url.to_string(),
        source: source.to_string(),
        category: category.to_string(),
        region: None,
        sector: None,
    }
}

fn classifier() -> ClassifierHandle {
    ClassifierHandle::new(
        ClassifierEngine::from_toml_str(DEFAULT_CLASSIFIER_CONFIG).expect("embedded config"),
    )
}

#[tokio::test]
async fn monetary_policy_headline_is_classified_and_kept() {
    let transport = MockTransport::new(&[("https://feeds.test/market", MARKET_RSS)]);
    let mut market = feed("https://feeds.test/market", "Market Wire", "Markets");
    market.region = Some("North America".to_string());

    let result = ingest::aggregate(transport, &[market], &classifier()).await;

    let fed = result
        .items
        .iter()
        .find(|i| i.title == "Fed cuts rates by 0.25%")
        .expect("scenario item present");
    assert_eq!(fed.category, "Monetary Policy");
    assert_eq!(fed.summary, "The Federal Reserve announced a quarter-point reduction to support growth.");
    assert_eq!(fed.url, "https://example.test/market/fed-cut");
    // No region keyword in the text, so the feed's pre-assigned tag applies.
    assert_eq!(fed.region.as_deref(), Some("North America"));
    assert_eq!(fed.published_at.to_rfc3339(), "2024-01-01T12:00:00+00:00");
}

#[tokio::test]
async fn titleless_fragment_contributes_nothing() {
    let transport = MockTransport::new(&[("https://feeds.test/market", MARKET_RSS)]);
    let market = feed("https://feeds.test/market", "Market Wire", "Markets");

    let result = ingest::aggregate(transport, &[market], &classifier()).await;

    // The fixture has 4 items, one of them without a title.
    assert_eq!(result.items.len(), 3);
    assert!(result.items.iter().all(|i| !i.title.is_empty()));
}

#[tokio::test]
async fn summaries_are_stripped_and_bounded() {
    let transport = MockTransport::new(&[("https://feeds.test/market", MARKET_RSS)]);
    let market = feed("https://feeds.test/market", "Market Wire", "Markets");

    let result = ingest::aggregate(transport, &[market], &classifier()).await;

    for item in &result.items {
        assert!(item.summary.chars().count() <= 300, "summary over cap");
        assert!(!item.summary.contains('<'), "summary kept an html tag: {}", item.summary);
    }
    let rally = result
        .items
        .iter()
        .find(|i| i.title.starts_with("Wall Street rallies"))
        .unwrap();
    assert_eq!(rally.summary, "Stocks closed higher after a strong earnings week.");
}

#[tokio::test]
async fn duplicate_title_prefixes_across_feeds_keep_one_item() {
    let transport = MockTransport::new(&[
        ("https://feeds.test/crypto", CRYPTO_RSS),
        ("https://feeds.test/ticker", CRYPTO_ALT_RSS),
    ]);
    let feeds = vec![
        feed("https://feeds.test/crypto", "Crypto Desk", "Crypto"),
        feed("https://feeds.test/ticker", "Coin Ticker", "Crypto"),
    ];

    let result = ingest::aggregate(transport, &feeds, &classifier()).await;

    let surges: Vec<_> = result
        .items
        .iter()
        .filter(|i| i.title.starts_with("Bitcoin surges past $50,000"))
        .collect();
    assert_eq!(surges.len(), 1, "title-prefix duplicates must collapse to one");
    // The distinct headlines from both feeds survive.
    assert!(result.items.iter().any(|i| i.title.starts_with("Ethereum upgrade")));
    assert!(result.items.iter().any(|i| i.title.starts_with("Stablecoin issuers")));
}

#[tokio::test(start_paused = true)]
async fn failed_feed_is_isolated_and_absent_from_sources() {
    // Only the crypto feed resolves; the market feed fails both attempts.
    let transport = MockTransport::new(&[("https://feeds.test/crypto", CRYPTO_RSS)]);
    let feeds = vec![
        feed("https://feeds.test/crypto", "Crypto Desk", "Crypto"),
        feed("https://feeds.test/down", "Dead Feed", "Markets"),
    ];

    let result = ingest::aggregate(transport, &feeds, &classifier()).await;

    assert!(!result.items.is_empty());
    assert!(result.sources.iter().any(|s| s == "Crypto Desk"));
    assert!(
        !result.sources.iter().any(|s| s == "Dead Feed"),
        "a feed with zero surviving items must not be listed"
    );
    assert!(!result.categories.contains(&"Markets".to_string()));
}

#[tokio::test(start_paused = true)]
async fn all_feeds_failing_yields_an_empty_result() {
    let transport = MockTransport::new(&[]);
    let feeds = vec![
        feed("https://feeds.test/a", "A", "General"),
        feed("https://feeds.test/b", "B", "General"),
    ];

    let result = ingest::aggregate(transport, &feeds, &classifier()).await;

    assert!(result.items.is_empty());
    assert!(result.sources.is_empty());
    assert!(result.categories.is_empty());
    assert!(result.categorized.is_empty());
}

#[tokio::test]
async fn atom_and_malformed_feeds_both_contribute() {
    let transport = MockTransport::new(&[
        ("https://feeds.test/tech", TECH_ATOM),
        ("https://feeds.test/energy", ENERGY_MALFORMED),
    ]);
    let feeds = vec![
        feed("https://feeds.test/tech", "Tech Review", "AI"),
        feed("https://feeds.test/energy", "Energy Desk", "Energy"),
    ];

    let result = ingest::aggregate(transport, &feeds, &classifier()).await;

    let llm = result
        .items
        .iter()
        .find(|i| i.title.starts_with("OpenAI debuts"))
        .expect("atom entry parsed");
    assert_eq!(llm.category, "AI");
    assert_eq!(llm.url, "https://example.test/tech/llm");

    let opec = result
        .items
        .iter()
        .find(|i| i.title.starts_with("Oil prices jump"))
        .expect("fragment-parsed item present");
    assert_eq!(opec.category, "Energy");
    assert_eq!(opec.sector.as_deref(), Some("Energy"));
}

fn synthetic_rss(feed_idx: usize, items: usize) -> String {
    let mut doc = String::from(r#"<?xml version="1.0"?><rss version="2.0"><channel>"#);
    for i in 0..items {
        let serial = feed_idx * items + i;
        let hour = serial / 60 % 24;
        let minute = serial % 60;
        doc.push_str(&format!(
            "<item><title>Feed {feed_idx} exclusive report number {serial}</title>\
             <link>https://example.test/{feed_idx}/{i}</link>\
             <pubDate>Mon, 01 Jan 2024 {hour:02}:{minute:02}:00 GMT</pubDate></item>"
        ));
    }
    doc.push_str("</channel></rss>");
    doc
}

#[tokio::test]
async fn result_is_sorted_newest_first_and_capped_at_fifty() {
    let bodies: Vec<(String, String)> = (0..4)
        .map(|f| (format!("https://feeds.test/syn{f}"), synthetic_rss(f, 15)))
        .collect();
    let pairs: Vec<(&str, &str)> = bodies
        .iter()
        .map(|(u, b)| (u.as_str(), b.as_str()))
        .collect();
    let transport = MockTransport::new(&pairs);
    let feeds: Vec<FeedDescriptor> = (0..4)
        .map(|f| feed(&format!("https://feeds.test/syn{f}"), &format!("Syn {f}"), "General"))
        .collect();

    let result = ingest::aggregate(transport, &feeds, &classifier()).await;

    assert_eq!(result.items.len(), MAX_ITEMS);
    for pair in result.items.windows(2) {
        assert!(
            pair[0].published_at >= pair[1].published_at,
            "items must be ordered newest first"
        );
    }
    // 60 distinct items went in; the 10 oldest were cut.
    assert_eq!(result.sources.len(), 4);
}

#[tokio::test]
async fn categorized_lists_partition_the_item_list() {
    let transport = MockTransport::new(&[
        ("https://feeds.test/market", MARKET_RSS),
        ("https://feeds.test/crypto", CRYPTO_RSS),
        ("https://feeds.test/tech", TECH_ATOM),
    ]);
    let feeds = vec![
        feed("https://feeds.test/market", "Market Wire", "Markets"),
        feed("https://feeds.test/crypto", "Crypto Desk", "Crypto"),
        feed("https://feeds.test/tech", "Tech Review", "AI"),
    ];

    let result = ingest::aggregate(transport, &feeds, &classifier()).await;

    // Every item appears exactly once under its own category.
    for item in &result.items {
        let bucket = result
            .categorized
            .get(&item.category)
            .expect("category bucket exists");
        assert_eq!(
            bucket.iter().filter(|i| i.title == item.title).count(),
            1,
            "item must appear exactly once in its bucket"
        );
    }

    // The concatenation of all buckets is a permutation of the flat list.
    let grouped_total: usize = result.categorized.values().map(Vec::len).sum();
    assert_eq!(grouped_total, result.items.len());

    // Bucket order follows the global recency order.
    for bucket in result.categorized.values() {
        for pair in bucket.windows(2) {
            assert!(pair[0].published_at >= pair[1].published_at);
        }
    }

    assert_eq!(result.categories, result.categorized.keys().cloned().collect::<Vec<_>>());
}
