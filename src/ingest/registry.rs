// src/ingest/registry.rs
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::ingest::types::FeedDescriptor;

/// Registry shipped with the binary; used unless FEEDS_CONFIG_PATH is set.
pub const DEFAULT_FEEDS_CONFIG: &str = include_str!("../../config/feeds.toml");
pub const ENV_FEEDS_CONFIG_PATH: &str = "FEEDS_CONFIG_PATH";

#[derive(Debug, Deserialize)]
struct FeedsRoot {
    feeds: Vec<FeedDescriptor>,
}

/// Parse a registry from TOML. Entries with an empty url or source are
/// rejected so a bad config fails at startup rather than at request time.
pub fn from_toml_str(toml_str: &str) -> Result<Vec<FeedDescriptor>> {
    let root: FeedsRoot = toml::from_str(toml_str).context("parsing feed registry toml")?;
    validate(&root.feeds)?;
    Ok(root.feeds)
}

/// Parse a registry from a JSON array of descriptors.
pub fn from_json_str(json_str: &str) -> Result<Vec<FeedDescriptor>> {
    let feeds: Vec<FeedDescriptor> =
        serde_json::from_str(json_str).context("parsing feed registry json")?;
    validate(&feeds)?;
    Ok(feeds)
}

fn validate(feeds: &[FeedDescriptor]) -> Result<()> {
    for feed in feeds {
        if feed.url.trim().is_empty() || feed.source.trim().is_empty() {
            anyhow::bail!("feed registry entry with empty url or source");
        }
    }
    Ok(())
}

/// Load a registry file; the extension selects the format (TOML unless .json).
pub fn load_from(path: &Path) -> Result<Vec<FeedDescriptor>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feed registry from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if ext == "json" {
        from_json_str(&content)
    } else {
        from_toml_str(&content)
    }
}

/// Load the registry: $FEEDS_CONFIG_PATH if set, else the embedded default.
pub fn load_default() -> Result<Vec<FeedDescriptor>> {
    if let Ok(p) = std::env::var(ENV_FEEDS_CONFIG_PATH) {
        return load_from(Path::new(&p));
    }
    from_toml_str(DEFAULT_FEEDS_CONFIG)
}
