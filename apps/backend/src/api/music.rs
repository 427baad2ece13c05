//! Music catalog API endpoints.
//!
//! Thin handlers over the configured [`CatalogProvider`](crate::services::CatalogProvider).

use axum::{
    extract::{Path, Query, State},
    middleware as axum_mw,
    response::Redirect,
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::{models::PlaylistWithSongs, queries};
use crate::error::{AppError, Result};
use crate::middleware::auth_middleware;
use crate::services::catalog::{CatalogArtist, CatalogTrack, SearchKind, SearchResults};
use crate::services::recommend::{self, HomeFeed};
use crate::services::Claims;
use crate::AppState;

pub const SEARCH_DEFAULT_LIMIT: u32 = 25;
pub const SEARCH_MAX_LIMIT: u32 = 50;

/// Query parameters for catalog search.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RadioQuery {
    pub limit: Option<u32>,
}

/// Search response: the echoed query plus tagged results.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub total: usize,
    #[serde(flatten)]
    pub results: SearchResults,
}

#[derive(Debug, Serialize)]
pub struct HomeResponse {
    pub playlists: Vec<PlaylistWithSongs>,
    #[serde(flatten)]
    pub feed: HomeFeed,
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/search", get(search))
        .route("/home", get(home))
        .route("/preview/:id", get(preview))
        .route("/artist/:id", get(artist))
        .route("/track/:id/similar", get(similar))
        .route("/recommendation/:id", get(recommendation))
        .route("/:id", get(track))
        .route_layer(axum_mw::from_fn_with_state(state, auth_middleware))
}

/// GET /api/music/search?query=&type=&limit=&offset=
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchResponse>> {
    let query = params
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| AppError::BadRequest("Query parameter 'query' is required".to_string()))?;
    let kind = params
        .kind
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Query parameter 'type' is required".to_string()))
        .and_then(SearchKind::parse)?;

    let limit = params
        .limit
        .unwrap_or(SEARCH_DEFAULT_LIMIT)
        .clamp(1, SEARCH_MAX_LIMIT);
    let offset = params.offset.unwrap_or(0);

    let results = state.catalog().search(query, kind, limit, offset).await?;

    tracing::debug!(query = %query, kind = ?kind, results = results.len(), "Catalog search");

    Ok(Json(SearchResponse {
        query: query.to_string(),
        total: results.len(),
        results,
    }))
}

/// GET /api/music/:id
pub async fn track(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CatalogTrack>> {
    state
        .catalog()
        .track(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Track {} not found", id)))
}

/// GET /api/music/preview/:id
///
/// Redirects to the track's audio preview.
pub async fn preview(State(state): State<AppState>, Path(id): Path<String>) -> Result<Redirect> {
    let track = state
        .catalog()
        .track(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Track {} not found", id)))?;

    let url = track
        .preview_url
        .ok_or_else(|| AppError::NotFound(format!("Track {} has no preview", id)))?;

    Ok(Redirect::temporary(&url))
}

/// GET /api/music/artist/:id
pub async fn artist(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CatalogArtist>> {
    state
        .catalog()
        .artist(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Artist {} not found", id)))
}

/// GET /api/music/track/:id/similar
pub async fn similar(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<CatalogTrack>>> {
    Ok(Json(recommend::similar_tracks(state.catalog(), &id).await?))
}

/// GET /api/music/recommendation/:id?limit=
pub async fn recommendation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<RadioQuery>,
) -> Result<Json<Vec<CatalogTrack>>> {
    let limit = recommend::radio_limit(params.limit);
    let tracks = state.catalog().radio(&id, limit).await?;

    Ok(Json(tracks.into_iter().filter(|t| t.id != id).collect()))
}

/// GET /api/music/home
///
/// The caller's playlists next to popular tracks, artists and genres.
pub async fn home(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<HomeResponse>> {
    let playlists = {
        let db = state.db.lock().await;
        queries::playlists_for_owner(&db, claims.sub)?
    };

    let feed = recommend::home_feed(state.catalog()).await?;

    Ok(Json(HomeResponse { playlists, feed }))
}
