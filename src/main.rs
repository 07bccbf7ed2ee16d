//! Market News Aggregator - Binary Entrypoint
//! Boots the Axum HTTP server, wiring routes, shared state, and middleware.

use std::path::PathBuf;

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use market_news_aggregator::api;
use market_news_aggregator::classify::{
    start_hot_reload_thread, ENV_CLASSIFIER_CONFIG_PATH, ENV_DEV_LOG,
};
use market_news_aggregator::metrics::Metrics;

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - NEWS_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var(ENV_DEV_LOG).ok().is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("classify=info,ingest=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments. This enables
    // FEEDS_CONFIG_PATH / CLASSIFIER_CONFIG_PATH overrides from .env.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let state = api::AppState::from_env().expect("failed to load service configuration");

    // If hot reload is enabled, spawn the background watcher for the
    // classifier keyword tables.
    let path = std::env::var(ENV_CLASSIFIER_CONFIG_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config/classifier.toml"));
    start_hot_reload_thread(state.classifier.clone(), path);

    let metrics = Metrics::init(state.registry.len());
    let router = api::router(state).merge(metrics.router());

    Ok(router.into())
}
