// src/classify.rs
//! Keyword-heuristic topic/region/sector assignment. Best-effort single-label
//! classification, not ground truth: ambiguous text can be mis-bucketed and
//! that is acceptable by contract.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use tracing::info;

pub const DEFAULT_CLASSIFIER_CONFIG: &str = include_str!("../config/classifier.toml");
pub const DEFAULT_CATEGORY: &str = "General";

pub const ENV_CLASSIFIER_CONFIG_PATH: &str = "CLASSIFIER_CONFIG_PATH";
pub const ENV_DEV_LOG: &str = "NEWS_DEV_LOG";
pub const ENV_HOT_RELOAD: &str = "CLASSIFIER_HOT_RELOAD";

/* ----------------------------
Config schema (from TOML)
---------------------------- */

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierRoot {
    #[serde(default = "default_category")]
    pub default_category: String,
    /// Ordered: on a tie in keyword hits, the category declared first wins.
    pub categories: Vec<CategoryCfg>,
    /// Ordered: the first region with any keyword hit is assigned.
    #[serde(default)]
    pub regions: Vec<RegionCfg>,
    /// Categories that double as industry sectors.
    #[serde(default)]
    pub sector_categories: Vec<String>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryCfg {
    pub name: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegionCfg {
    pub name: String,
    pub keywords: Vec<String>,
}

/// Result of classifying one item's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: String,
    pub region: Option<String>,
    pub sector: Option<String>,
    /// Keyword hits of the winning category; 0 means the default was used.
    pub matched: usize,
}

/* ----------------------------
Engine
---------------------------- */

#[derive(Debug)]
pub struct ClassifierEngine {
    cfg: ClassifierRoot,
}

impl ClassifierEngine {
    /// Build from a TOML string. Keywords are lowercased once here so the
    /// per-item scan only lowercases the item text.
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let mut cfg: ClassifierRoot = toml::from_str(toml_str)?;
        if cfg.categories.is_empty() {
            anyhow::bail!("classifier config declares no categories");
        }
        for cat in &mut cfg.categories {
            for kw in &mut cat.keywords {
                *kw = kw.to_lowercase();
            }
        }
        for region in &mut cfg.regions {
            for kw in &mut region.keywords {
                *kw = kw.to_lowercase();
            }
        }
        Ok(Self { cfg })
    }

    /// Load from $CLASSIFIER_CONFIG_PATH if set, else the embedded default.
    pub fn from_toml() -> anyhow::Result<Self> {
        match std::env::var(ENV_CLASSIFIER_CONFIG_PATH) {
            Ok(path) => {
                let content = fs::read_to_string(&path).map_err(|e| {
                    anyhow::anyhow!("failed to read classifier config at {path}: {e}")
                })?;
                Self::from_toml_str(&content)
            }
            Err(_) => Self::from_toml_str(DEFAULT_CLASSIFIER_CONFIG),
        }
    }

    /// Assign a topic category, and optionally a region and sector, to one
    /// item. When no keyword matches, the owning feed's `feed_default` wins,
    /// then the configured default category.
    pub fn classify(
        &self,
        title: &str,
        summary: &str,
        feed_default: Option<&str>,
    ) -> Classification {
        let haystack = format!("{title} {summary}").to_lowercase();

        let mut best: Option<(&str, usize)> = None;
        for cat in &self.cfg.categories {
            let hits = cat
                .keywords
                .iter()
                .filter(|kw| haystack.contains(kw.as_str()))
                .count();
            // Strictly-greater keeps the earlier declaration on ties.
            if hits > 0 && best.map_or(true, |(_, b)| hits > b) {
                best = Some((cat.name.as_str(), hits));
            }
        }

        let (category, matched) = match best {
            Some((name, hits)) => (name.to_string(), hits),
            None => (
                feed_default
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or(&self.cfg.default_category)
                    .to_string(),
                0,
            ),
        };

        let region = self
            .cfg
            .regions
            .iter()
            .find(|r| r.keywords.iter().any(|kw| haystack.contains(kw.as_str())))
            .map(|r| r.name.clone());

        let sector = self
            .cfg
            .sector_categories
            .iter()
            .any(|s| s == &category)
            .then(|| category.clone());

        let out = Classification {
            category,
            region,
            sector,
            matched,
        };
        dev_log_classification(&haystack, &out);
        out
    }
}

/* ----------------------------
Dev diagnostics (anonymized)
---------------------------- */

fn dev_logging_enabled() -> bool {
    std::env::var(ENV_DEV_LOG).ok().as_deref() == Some("1")
}

/// Short stable id for an item's text; raw text is never logged.
fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn dev_log_classification(haystack: &str, out: &Classification) {
    if !dev_logging_enabled() {
        return;
    }
    let id = anon_hash(haystack);
    info!(
        target: "classify",
        %id,
        category = %out.category,
        region = ?out.region,
        sector = ?out.sector,
        matched = out.matched,
        "classified item"
    );
}

/* ----------------------------
Thread-safe handle + hot reload
---------------------------- */

/// Threadsafe handle that can hot-reload the engine in dev/local, so keyword
/// tables can be tuned without a redeploy.
#[derive(Clone)]
pub struct ClassifierHandle {
    inner: Arc<RwLock<ClassifierEngine>>,
}

impl ClassifierHandle {
    pub fn new(engine: ClassifierEngine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(engine)),
        }
    }

    pub fn classify(
        &self,
        title: &str,
        summary: &str,
        feed_default: Option<&str>,
    ) -> Classification {
        match self.inner.read() {
            Ok(engine) => engine.classify(title, summary, feed_default),
            // Poisoned lock: degrade to the feed default rather than fail.
            Err(_) => Classification {
                category: feed_default.unwrap_or(DEFAULT_CATEGORY).to_string(),
                region: None,
                sector: None,
                matched: 0,
            },
        }
    }
}

fn hot_reload_enabled() -> bool {
    let want = std::env::var(ENV_HOT_RELOAD).ok().as_deref() == Some("1");
    if !want {
        return false;
    }
    cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        )
}

/// Poll `path` for mtime changes and swap the engine in place. Dev-gated.
pub fn start_hot_reload_thread(handle: ClassifierHandle, path: PathBuf) {
    if !hot_reload_enabled() {
        return;
    }

    thread::spawn(move || {
        let poll = Duration::from_secs(2);
        let mut last_mtime: Option<SystemTime> = None;

        loop {
            if let Ok(mtime) = fs::metadata(&path).and_then(|m| m.modified()) {
                let changed = match last_mtime {
                    None => {
                        last_mtime = Some(mtime);
                        false
                    }
                    Some(prev) => mtime > prev,
                };
                if changed {
                    if let Ok(content) = fs::read_to_string(&path) {
                        if let Ok(new_engine) = ClassifierEngine::from_toml_str(&content) {
                            if let Ok(mut guard) = handle.inner.write() {
                                *guard = new_engine;
                            }
                        }
                    }
                    last_mtime = Some(mtime);
                }
            }
            thread::sleep(poll);
        }
    });
}

/* ----------------------------
Tests
---------------------------- */
