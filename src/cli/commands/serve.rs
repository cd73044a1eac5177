//! HTTP query API for external front ends.
//!
//! Read-only: every handler queries the store and holds no state between
//! requests.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::error::ParlError;
use crate::graph::{ExportFormat, NodeType};
use crate::pipeline::Pipeline;
use crate::query::{QueryEngine, ResultRecord, SearchFilters};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Shared application state.
struct AppState {
    pipeline: Pipeline,
    engine: QueryEngine,
}

/// Build the API router.
fn router(pipeline: Pipeline) -> Router {
    let engine = pipeline.query_engine();
    let state = Arc::new(AppState { pipeline, engine });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/search", post(search))
        .route("/lookup", get(lookup))
        .route("/videos", get(list_videos))
        .route("/videos/{video_id}/graph", get(video_graph))
        .layer(cors)
        .with_state(state)
}

/// Run the HTTP API server.
pub async fn run_serve(host: &str, port: u16, settings: Settings) -> anyhow::Result<()> {
    preflight::check(Operation::Search, &settings)?;
    let app = router(Pipeline::new(settings)?);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("parlgraph API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Search", "POST /search");
    Output::kv("Lookup", "GET  /lookup?type=ministry&label=...");
    Output::kv("List Videos", "GET  /videos");
    Output::kv("Video Graph", "GET  /videos/{video_id}/graph?format=ttl|jsonld");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;

    Ok(())
}

// === Request/Response Types ===

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum SearchMode {
    #[default]
    Semantic,
    Keyword,
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    filters: SearchFilters,
    #[serde(default)]
    mode: SearchMode,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<ResultRecord>,
}

#[derive(Deserialize)]
struct LookupParams {
    #[serde(rename = "type")]
    entity_type: String,
    label: String,
}

#[derive(Deserialize)]
struct GraphParams {
    #[serde(default)]
    format: Option<String>,
}

#[derive(Serialize)]
struct VideoInfo {
    video_id: String,
    title: String,
    session_date: Option<String>,
    segment_count: usize,
    duration_seconds: f64,
}

#[derive(Serialize)]
struct VideoListResponse {
    videos: Vec<VideoInfo>,
    total: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn status_for(error: &ParlError) -> StatusCode {
    match error {
        ParlError::NotFound(_) => StatusCode::NOT_FOUND,
        ParlError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// === Handlers ===

async fn health(State(state): State<Arc<AppState>>) -> Response {
    match state.pipeline.store().stats().await {
        Ok(stats) => Json(serde_json::json!({
            "status": "ok",
            "videos": stats.videos,
            "statements": stats.statements,
        }))
        .into_response(),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

async fn search(State(state): State<Arc<AppState>>, Json(req): Json<SearchRequest>) -> Response {
    let results = match req.mode {
        SearchMode::Semantic => state.engine.search(&req.query, &req.filters).await,
        SearchMode::Keyword => state.engine.keyword_search(&req.query, &req.filters).await,
    };
    Json(SearchResponse { results }).into_response()
}

async fn lookup(State(state): State<Arc<AppState>>, Query(params): Query<LookupParams>) -> Response {
    let node_type = match params.entity_type.parse::<NodeType>() {
        Ok(t) if t.is_entity() => t,
        Ok(t) => return error_response(StatusCode::BAD_REQUEST, format!("'{}' is not an entity type", t)),
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    let results = state.engine.lookup_entity(node_type, &params.label).await;
    Json(SearchResponse { results }).into_response()
}

async fn list_videos(State(state): State<Arc<AppState>>) -> Response {
    match state.pipeline.store().list_videos().await {
        Ok(videos) => {
            let videos: Vec<VideoInfo> = videos
                .iter()
                .map(|v| VideoInfo {
                    video_id: v.video_id.clone(),
                    title: v.title.clone(),
                    session_date: v.session_date.map(|d| d.to_string()),
                    segment_count: v.segments.len(),
                    duration_seconds: v.duration(),
                })
                .collect();
            let total = videos.len();
            Json(VideoListResponse { videos, total }).into_response()
        }
        Err(e) => error_response(status_for(&e), e.to_string()),
    }
}

async fn video_graph(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
    Query(params): Query<GraphParams>,
) -> Response {
    let format = match params.format.as_deref().unwrap_or("ttl").parse::<ExportFormat>() {
        Ok(f) => f,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    match state.pipeline.export_graph(&video_id, format).await {
        Ok(body) => {
            let content_type = match format {
                ExportFormat::Turtle => "text/turtle; charset=utf-8",
                ExportFormat::JsonLd => "application/ld+json",
            };
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(e) => error_response(status_for(&e), e.to_string()),
    }
}
