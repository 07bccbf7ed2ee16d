// src/api.rs
use std::sync::Arc;

use serde::Deserialize;
use shuttle_axum::axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error};

use crate::classify::{ClassifierEngine, ClassifierHandle};
use crate::ingest;
use crate::ingest::fetcher::HttpTransport;
use crate::ingest::registry;
use crate::ingest::types::{FeedDescriptor, FeedTransport};
use crate::response::{self, CACHE_MAX_AGE_SECS};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Vec<FeedDescriptor>>,
    pub classifier: ClassifierHandle,
    pub transport: Arc<dyn FeedTransport>,
}

impl AppState {
    pub fn new(
        registry: Vec<FeedDescriptor>,
        classifier: ClassifierHandle,
        transport: Arc<dyn FeedTransport>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            classifier,
            transport,
        }
    }

    /// Production wiring: embedded configs (with env overrides) + reqwest.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::new(
            registry::load_default()?,
            ClassifierHandle::new(ClassifierEngine::from_toml()?),
            Arc::new(HttpTransport::new()),
        ))
    }
}

/// The endpoint is called directly from browser dashboards, so CORS is wide
/// open for the standard client headers.
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ])
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/news", post(aggregate_news))
        .layer(cors())
        .with_state(state)
}

/// Optional request body. Accepted for compatibility with dashboard callers;
/// filtering happens client-side and the full registry is always processed.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewsRequest {
    pub category: Option<String>,
    pub force_refresh: bool,
}

async fn aggregate_news(
    State(state): State<AppState>,
    body: Option<Json<NewsRequest>>,
) -> (StatusCode, [(HeaderName, String); 1], Json<response::NewsResponse>) {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    if let Some(category) = &req.category {
        debug!(%category, force_refresh = req.force_refresh, "category hint received");
    }

    let registry = Arc::clone(&state.registry);
    let classifier = state.classifier.clone();
    let transport = Arc::clone(&state.transport);

    // Per-feed failures are absorbed inside the pipeline; a panic escaping
    // the merge stage surfaces here as a JoinError and yields the fallback
    // payload. Both outcomes are HTTP 200; callers check `success`.
    let outcome = tokio::spawn(async move {
        ingest::aggregate(transport, registry.as_slice(), &classifier).await
    })
    .await;

    match outcome {
        Ok(result) => (
            StatusCode::OK,
            [(
                header::CACHE_CONTROL,
                format!("public, max-age={CACHE_MAX_AGE_SECS}"),
            )],
            Json(response::success(result)),
        ),
        Err(e) => {
            error!(error = ?e, "aggregation pipeline crashed");
            (
                StatusCode::OK,
                [(header::CACHE_CONTROL, "no-store".to_string())],
                Json(response::fallback("news aggregation failed unexpectedly")),
            )
        }
    }
}
