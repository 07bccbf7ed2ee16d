// src/ingest/parser.rs
//! Field extraction from one raw `<item>`/`<entry>` block, plus the text and
//! timestamp normalization applied to every item that survives extraction.
//!
//! The patterns are deliberately tolerant: attributes on tags and optional
//! CDATA wrapping are accepted, and a fragment without a title is unusable
//! and dropped.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::ingest::types::RawFeedItem;

/// Summaries are truncated to this many characters.
pub const SUMMARY_MAX_CHARS: usize = 300;

fn re(cell: &'static OnceCell<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("parser regex"))
}

static RE_TITLE: OnceCell<Regex> = OnceCell::new();
static RE_SUMMARY: OnceCell<Regex> = OnceCell::new();
static RE_LINK_TEXT: OnceCell<Regex> = OnceCell::new();
static RE_LINK_HREF: OnceCell<Regex> = OnceCell::new();
static RE_PUB_DATE: OnceCell<Regex> = OnceCell::new();
static RE_GUID: OnceCell<Regex> = OnceCell::new();
static RE_TAGS: OnceCell<Regex> = OnceCell::new();
static RE_WS: OnceCell<Regex> = OnceCell::new();

fn capture(re: &Regex, fragment: &str) -> Option<String> {
    re.captures(fragment)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extract the raw fields of one fragment. Returns `None` when no title can
/// be extracted; such a fragment is not publishable.
pub fn parse_fragment(fragment: &str) -> Option<RawFeedItem> {
    let title = capture(
        re(
            &RE_TITLE,
            r"(?is)<title(?:\s[^>]*)?>\s*(?:<!\[CDATA\[)?(.*?)(?:\]\]>)?\s*</title>",
        ),
        fragment,
    )?;

    let summary = capture(
        re(
            &RE_SUMMARY,
            r"(?is)<(?:description|summary|content)(?:\s[^>]*)?>\s*(?:<!\[CDATA\[)?(.*?)(?:\]\]>)?\s*</(?:description|summary|content)[^>]*>",
        ),
        fragment,
    );

    // RSS carries the link as element text; Atom as an href attribute.
    let link = capture(
        re(
            &RE_LINK_TEXT,
            r"(?is)<link(?:\s[^>]*)?>\s*(?:<!\[CDATA\[)?(.*?)(?:\]\]>)?\s*</link>",
        ),
        fragment,
    )
    .or_else(|| {
        capture(
            re(&RE_LINK_HREF, r#"(?is)<link[^>]*?href\s*=\s*["']([^"']+)["']"#),
            fragment,
        )
    });

    let published = capture(
        re(
            &RE_PUB_DATE,
            r"(?is)<(?:pubDate|published|updated|dc:date)(?:\s[^>]*)?>(.*?)</(?:pubDate|published|updated|dc:date)[^>]*>",
        ),
        fragment,
    );

    let guid = capture(
        re(
            &RE_GUID,
            r"(?is)<(?:guid|id)(?:\s[^>]*)?>\s*(?:<!\[CDATA\[)?(.*?)(?:\]\]>)?\s*</(?:guid|id)>",
        ),
        fragment,
    );

    Some(RawFeedItem {
        title,
        summary,
        link,
        guid,
        published,
    })
}

/// Normalize text pulled out of a feed: decode HTML entities, strip tags,
/// collapse whitespace, trim.
pub fn clean_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s).to_string();

    let re_tags = re(&RE_TAGS, r"(?is)</?[^>]+>");
    let stripped = re_tags.replace_all(&decoded, " ");

    let re_ws = re(&RE_WS, r"\s+");
    re_ws.replace_all(&stripped, " ").trim().to_string()
}

/// Cleaned summary text, truncated to [`SUMMARY_MAX_CHARS`] characters.
pub fn summarize(s: &str) -> String {
    let cleaned = clean_text(s);
    if cleaned.chars().count() <= SUMMARY_MAX_CHARS {
        return cleaned;
    }
    cleaned.chars().take(SUMMARY_MAX_CHARS).collect()
}

/// Item URL preference: `link`, then `guid`, then the `"#"` sentinel.
pub fn resolve_url(link: Option<&str>, guid: Option<&str>) -> String {
    link.or(guid)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "#".to_string())
}

fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    // RFC 2822 is the RSS convention, RFC 3339 the Atom one. chrono's 2822
    // parser covers obsolete zone spellings the time crate may reject.
    if let Ok(dt) = OffsetDateTime::parse(ts, &Rfc2822) {
        return DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), 0);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(ts) {
        return Some(dt.with_timezone(&Utc));
    }
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Publish time of an item. Absent or unparsable timestamps resolve to the
/// current wall-clock time, which biases such items toward the top of the
/// recency sort.
pub fn parse_pub_date(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(parse_timestamp).unwrap_or_else(Utc::now)
}
