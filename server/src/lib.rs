use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use crawler::IndexingService;
use search_core::response::{Ack, Failure, SearchResponse, StatisticsResponse};
use search_core::stats::statistics;
use search_core::{open_store, Config, Error, LemmaExtractor, SearchEngine, SearchRequest, StemmerMorphology, Store};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
    pub site: Option<String>,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}
fn default_limit() -> i64 { 20 }

#[derive(Deserialize)]
pub struct IndexPageParams {
    #[serde(default)]
    pub url: String,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub indexing: IndexingService,
    pub search: Arc<SearchEngine>,
}

impl AppState {
    pub fn new(config: Arc<Config>, store: Arc<Store>) -> Result<Self> {
        let indexing = IndexingService::new(Arc::clone(&config), Arc::clone(&store))?;
        let search = SearchEngine::new(
            Arc::clone(&config),
            Arc::clone(&store),
            LemmaExtractor::new(Arc::new(StemmerMorphology::russian())),
        );
        Ok(Self { config, store, indexing, search: Arc::new(search) })
    }
}

/// Error reply: `{ "result": false, "message": ... }` with a status per error kind.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::EmptyQuery | Error::InvalidRange { .. } | Error::OutOfScope(_) => StatusCode::BAD_REQUEST,
            Error::AlreadyRunning | Error::NotRunning | Error::AlreadySearching => StatusCode::CONFLICT,
            Error::NoMatchingLemmas => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }
        (status, Json(Failure::from(&self.0))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

pub fn build_app(config: Config) -> Result<Router> {
    let config = Arc::new(config);
    let store = open_store(&config)?;
    Ok(app(AppState::new(config, store)?))
}

pub fn app(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/statistics", get(statistics_handler))
        .route("/api/startIndexing", get(start_indexing_handler))
        .route("/api/stopIndexing", get(stop_indexing_handler))
        .route("/api/indexPage", post(index_page_handler))
        .route("/api/search", get(search_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn statistics_handler(State(state): State<AppState>) -> Json<StatisticsResponse> {
    let data = statistics(&state.config, &state.store, state.indexing.is_indexing());
    Json(StatisticsResponse { result: true, statistics: data })
}

/// Starts a background run; the reply does not wait for it.
pub async fn start_indexing_handler(State(state): State<AppState>) -> ApiResult<Ack> {
    let _detached = state.indexing.start_indexing()?;
    Ok(Json(Ack::ok()))
}

pub async fn stop_indexing_handler(State(state): State<AppState>) -> ApiResult<Ack> {
    state.indexing.stop_indexing()?;
    Ok(Json(Ack::ok()))
}

pub async fn index_page_handler(State(state): State<AppState>, Query(params): Query<IndexPageParams>) -> ApiResult<Ack> {
    state.indexing.index_single_page(&params.url).await?;
    Ok(Json(Ack::ok()))
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> ApiResult<SearchResponse> {
    let mut request = SearchRequest::new(params.query).page(params.offset, params.limit);
    if let Some(site) = params.site.filter(|s| !s.trim().is_empty()) {
        request = request.site(site);
    }
    let hits = state.search.search(&request)?;
    Ok(Json(SearchResponse { result: true, count: hits.count, data: hits.data }))
}
