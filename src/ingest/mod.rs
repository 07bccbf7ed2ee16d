// src/ingest/mod.rs
pub mod fetcher;
pub mod parser;
pub mod registry;
pub mod types;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use tokio::task::JoinSet;
use tracing::warn;

use crate::classify::ClassifierHandle;
use crate::ingest::types::{AggregatedResult, FeedDescriptor, FeedTransport, NewsItem};

/// The final item list is capped at this size after dedup and sort.
pub const MAX_ITEMS: usize = 50;
/// Two items whose lowercase title prefixes of this length match are
/// considered duplicates. Kept at 50 for compatibility with existing callers;
/// near-duplicates that diverge only beyond the prefix are not caught.
pub const TITLE_DEDUP_PREFIX: usize = 50;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feed_items_total", "Items parsed from feeds.");
        describe_counter!("feed_fetch_errors_total", "Feed fetch attempt failures.");
        describe_counter!("feed_task_panics_total", "Feed tasks that panicked.");
        describe_counter!("aggregate_runs_total", "Aggregation pipeline runs.");
        describe_counter!(
            "aggregate_dedup_total",
            "Items removed by title-prefix deduplication."
        );
        describe_histogram!("feed_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!(
            "aggregate_last_run_ts",
            "Unix ts when the aggregation pipeline last ran."
        );
    });
}

fn title_key(title: &str) -> String {
    title
        .chars()
        .take(TITLE_DEDUP_PREFIX)
        .collect::<String>()
        .to_lowercase()
}

/// Drop items whose title prefix was already seen; first-seen wins.
pub fn dedup_by_title_prefix(items: Vec<NewsItem>) -> Vec<NewsItem> {
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
    let before = items.len();
    let kept: Vec<NewsItem> = items
        .into_iter()
        .filter(|item| seen.insert(title_key(&item.title)))
        .collect();
    counter!("aggregate_dedup_total").increment((before - kept.len()) as u64);
    kept
}

/// Group items by category, preserving the (already sorted) item order
/// within each category's list.
pub fn group_by_category(items: &[NewsItem]) -> BTreeMap<String, Vec<NewsItem>> {
    let mut out: BTreeMap<String, Vec<NewsItem>> = BTreeMap::new();
    for item in items {
        out.entry(item.category.clone()).or_default().push(item.clone());
    }
    out
}

/// Distinct values in first-appearance order.
pub fn distinct_in_order<'a, I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: HashSet<&str> = HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(v))
        .map(str::to_string)
        .collect()
}

/// Run the full pipeline once: fan out over every registered feed, merge the
/// survivors, dedup, sort newest-first, cap, group.
///
/// A feed that fails or panics contributes zero items; this function itself
/// does not fail on any per-feed outcome.
pub async fn aggregate(
    transport: Arc<dyn FeedTransport>,
    registry: &[FeedDescriptor],
    classifier: &ClassifierHandle,
) -> AggregatedResult {
    ensure_metrics_described();
    let started = Instant::now();

    // Scatter: one task per feed, all in flight at once. The registry is
    // small and fixed, so the fan-out is bounded by configuration.
    let mut tasks: JoinSet<Vec<NewsItem>> = JoinSet::new();
    for feed in registry.iter().cloned() {
        let transport = Arc::clone(&transport);
        let classifier = classifier.clone();
        tasks.spawn(async move {
            fetcher::fetch_feed(transport.as_ref(), &feed, &classifier).await
        });
    }

    // Gather: wait for every task to settle. Completion order is irrelevant;
    // the merged list is sorted below.
    let mut merged: Vec<NewsItem> = Vec::new();
    while let Some(settled) = tasks.join_next().await {
        match settled {
            Ok(mut items) => merged.append(&mut items),
            Err(e) => {
                warn!(error = ?e, "feed task panicked");
                counter!("feed_task_panics_total").increment(1);
            }
        }
    }

    let mut items = dedup_by_title_prefix(merged);
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    items.truncate(MAX_ITEMS);

    let categorized = group_by_category(&items);
    let sources = distinct_in_order(items.iter().map(|i| i.source.as_str()));
    let categories = categorized.keys().cloned().collect();

    let last_updated = Utc::now();
    counter!("aggregate_runs_total").increment(1);
    gauge!("aggregate_last_run_ts").set(last_updated.timestamp().max(0) as f64);

    AggregatedResult {
        items,
        categorized,
        sources,
        categories,
        last_updated,
        processing_time_ms: started.elapsed().as_millis() as u64,
    }
}
