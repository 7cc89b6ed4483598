use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::models::{Aggregate, ApiResponse, CommentaryBuckets, Match, Sport};
use crate::services::aggregator::FormatFilter;
use crate::services::feeds::{self, FeedKind, FeedSpec};
use crate::services::{CommentarySource, FeedState, FetchError, PollerHandle, UpstreamClient};
use crate::utils::{parse_format_list, validate_match_id};

const DEFAULT_RESULTS_LIMIT: usize = 20;
const MAX_RESULTS_LIMIT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    client: UpstreamClient,
    config: Arc<Config>,
    live: Arc<PollerHandle<Aggregate>>,
    hero: Arc<PollerHandle<Aggregate>>,
}

impl AppState {
    /// Starts the live and hero pollers; they run until the state is dropped.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let client = config.client()?;
        let live = feeds::spawn_feed(&client, FeedSpec::for_kind(FeedKind::Live, &config));
        let hero = feeds::spawn_feed(&client, FeedSpec::for_kind(FeedKind::Hero, &config));
        Ok(Self {
            client,
            config: Arc::new(config),
            live: Arc::new(live),
            hero: Arc::new(hero),
        })
    }

    fn feed(&self, name: &str) -> Result<&PollerHandle<Aggregate>, ApiError> {
        match name.parse::<FeedKind>() {
            Ok(FeedKind::Live) => Ok(&self.live),
            Ok(FeedKind::Hero) => Ok(&self.hero),
            Err(e) => Err(bad_request(e)),
        }
    }
}

pub async fn serve(port: u16, config: Config) -> anyhow::Result<()> {
    tracing::info!(upstream = %config.api_base_url, "using backend API");
    let app = create_router().with_state(AppState::new(config)?);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("scorecast API server listening on port {}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/feeds/{feed}", get(get_feed_handler))
        .route("/feeds/{feed}/refresh", post(refresh_feed_handler))
        .route("/feeds/{feed}/auto-refresh", put(auto_refresh_handler))
        .route("/results", get(get_results_handler))
        .route("/matches/{id}", get(get_match_handler))
        .route("/matches/{id}/commentary", get(get_commentary_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

type ApiError = (StatusCode, Json<ApiResponse<()>>);

fn bad_request(message: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::error(message)))
}

fn upstream_error(e: FetchError) -> ApiError {
    let status = match e {
        FetchError::Shape { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::BAD_GATEWAY,
    };
    (status, Json(ApiResponse::error(e.to_string())))
}

// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<String>> {
    Json(ApiResponse::success(format!(
        "scorecast is running against {}",
        state.config.api_base_url
    )))
}

// GET /feeds/{feed} - Current state of an aggregated feed
async fn get_feed_handler(
    State(state): State<AppState>,
    Path(feed): Path<String>,
) -> Result<Json<ApiResponse<FeedState<Aggregate>>>, ApiError> {
    let handle = state.feed(&feed)?;
    Ok(Json(ApiResponse::success(handle.snapshot())))
}

// POST /feeds/{feed}/refresh - Manual refresh, errors surface in the state
async fn refresh_feed_handler(
    State(state): State<AppState>,
    Path(feed): Path<String>,
) -> Result<Json<ApiResponse<FeedState<Aggregate>>>, ApiError> {
    let handle = state.feed(&feed)?;
    let outcome = handle.refresh_now().await;
    tracing::info!(feed = handle.name(), ?outcome, "manual refresh");
    Ok(Json(ApiResponse::success(handle.snapshot())))
}

// PUT /feeds/{feed}/auto-refresh - Toggle the poll timer
#[derive(Deserialize)]
struct AutoRefreshRequest {
    enabled: bool,
}

async fn auto_refresh_handler(
    State(state): State<AppState>,
    Path(feed): Path<String>,
    Json(request): Json<AutoRefreshRequest>,
) -> Result<Json<ApiResponse<FeedState<Aggregate>>>, ApiError> {
    let handle = state.feed(&feed)?;
    handle.set_auto_refresh(request.enabled);
    Ok(Json(ApiResponse::success(handle.snapshot())))
}

// GET /results - Completed matches, optionally filtered by format
#[derive(Deserialize)]
struct ResultsQuery {
    format: Option<String>,
    sport: Option<String>,
    limit: Option<usize>,
}

async fn get_results_handler(
    State(state): State<AppState>,
    Query(params): Query<ResultsQuery>,
) -> Result<Json<ApiResponse<Vec<Match>>>, ApiError> {
    let sport = params
        .sport
        .as_deref()
        .map(str::parse::<Sport>)
        .transpose()
        .map_err(bad_request)?;
    let filter = FormatFilter {
        formats: params.format.as_deref().map(parse_format_list).unwrap_or_default(),
        precedence: state.config.format_precedence.clone(),
    };
    let limit = params.limit.unwrap_or(DEFAULT_RESULTS_LIMIT).min(MAX_RESULTS_LIMIT);

    match feeds::fetch_results(&state.client, sport, &filter, limit).await {
        Ok(matches) => Ok(Json(ApiResponse::success(matches))),
        Err(e) => {
            tracing::error!("Failed to fetch results: {}", e);
            Err(upstream_error(e))
        }
    }
}

// GET /matches/{id} - Match header
async fn get_match_handler(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> Result<Json<ApiResponse<Match>>, ApiError> {
    if !validate_match_id(&match_id) {
        return Err(bad_request(format!("invalid match id '{}'", match_id)));
    }

    match state.client.fetch_match(&match_id).await {
        Ok(m) => Ok(Json(ApiResponse::success(m))),
        Err(e) => {
            tracing::error!("Failed to fetch match {}: {}", match_id, e);
            Err(upstream_error(e))
        }
    }
}

// GET /matches/{id}/commentary - Normalized ball-by-ball commentary
#[derive(Deserialize)]
struct CommentaryQuery {
    source: Option<String>,
}

async fn get_commentary_handler(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
    Query(params): Query<CommentaryQuery>,
) -> Result<Json<ApiResponse<CommentaryBuckets>>, ApiError> {
    if !validate_match_id(&match_id) {
        return Err(bad_request(format!("invalid match id '{}'", match_id)));
    }
    let source = params
        .source
        .as_deref()
        .map(str::parse::<CommentarySource>)
        .transpose()
        .map_err(bad_request)?
        .unwrap_or_default();

    match state.client.fetch_commentary(&match_id, source).await {
        Ok(buckets) => Ok(Json(ApiResponse::success(buckets))),
        Err(e) => {
            tracing::error!("Failed to fetch commentary for {}: {}", match_id, e);
            Err(upstream_error(e))
        }
    }
}
