//! Playlist API endpoints.
//!
//! Every playlist is private to its owner: other users get 403.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware as axum_mw,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use rusqlite::Connection;
use serde::Deserialize;

use crate::api::auth::SuccessResponse;
use crate::db::{
    models::{Playlist, PlaylistWithSongs},
    queries,
};
use crate::error::{AppError, Result};
use crate::middleware::auth_middleware;
use crate::services::catalog::{CatalogArtist, CatalogTrack};
use crate::services::Claims;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreatePlaylistRequest {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlaylistRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddSongRequest {
    #[serde(rename = "songId", alias = "song_id")]
    pub song_id: String,
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(list_playlists).post(create_playlist))
        .route(
            "/:id",
            get(get_playlist)
                .put(update_playlist)
                .delete(delete_playlist),
        )
        .route("/:id/songs", post(add_song))
        .route("/:id/songs/:song_id", delete(remove_song))
        .route_layer(axum_mw::from_fn_with_state(state, auth_middleware))
}

/// Load a playlist and check that `user_id` owns it.
fn owned_playlist(conn: &Connection, playlist_id: i64, user_id: i64) -> Result<Playlist> {
    let playlist = queries::find_playlist(conn, playlist_id)?
        .ok_or_else(|| AppError::NotFound(format!("Playlist {} not found", playlist_id)))?;

    if playlist.owner_id != user_id {
        tracing::debug!(playlist_id, user_id, "Playlist access refused");
        return Err(AppError::Forbidden);
    }

    Ok(playlist)
}

fn required_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Playlist name is required".to_string()));
    }
    Ok(name)
}

/// GET /api/playlist
pub async fn list_playlists(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<PlaylistWithSongs>>> {
    let db = state.db.lock().await;
    Ok(Json(queries::playlists_for_owner(&db, claims.sub)?))
}

/// POST /api/playlist
pub async fn create_playlist(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<CreatePlaylistRequest>,
) -> Result<(StatusCode, Json<PlaylistWithSongs>)> {
    let name = required_name(&body.name)?;

    let db = state.db.lock().await;

    // A token can outlive its account
    if queries::find_user_by_id(&db, claims.sub)?.is_none() {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    let playlist_id = queries::insert_playlist(&db, claims.sub, name, body.description.as_deref())?;
    let playlist = owned_playlist(&db, playlist_id, claims.sub)?;

    tracing::info!(playlist_id, user_id = claims.sub, "Playlist created");

    Ok((
        StatusCode::CREATED,
        Json(queries::playlist_with_songs(&db, playlist)?),
    ))
}

/// GET /api/playlist/:id
pub async fn get_playlist(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<PlaylistWithSongs>> {
    let db = state.db.lock().await;
    let playlist = owned_playlist(&db, id, claims.sub)?;
    Ok(Json(queries::playlist_with_songs(&db, playlist)?))
}

/// PUT /api/playlist/:id
pub async fn update_playlist(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(body): Json<UpdatePlaylistRequest>,
) -> Result<Json<PlaylistWithSongs>> {
    let db = state.db.lock().await;
    let current = owned_playlist(&db, id, claims.sub)?;

    let name = match body.name.as_deref() {
        Some(name) => required_name(name)?.to_string(),
        None => current.name,
    };
    let description = body.description.or(current.description);

    queries::update_playlist(&db, id, &name, description.as_deref())?;
    let playlist = owned_playlist(&db, id, claims.sub)?;

    tracing::info!(playlist_id = id, "Playlist updated");

    Ok(Json(queries::playlist_with_songs(&db, playlist)?))
}

/// DELETE /api/playlist/:id
pub async fn delete_playlist(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>> {
    let db = state.db.lock().await;
    owned_playlist(&db, id, claims.sub)?;
    queries::delete_playlist(&db, id)?;

    tracing::info!(playlist_id = id, "Playlist deleted");

    Ok(Json(SuccessResponse {
        message: "Playlist deleted".to_string(),
    }))
}

/// Full catalog record of a track's primary artist, if it is not cached yet.
///
/// A failed lookup only costs the genres, so it is logged and skipped.
async fn artist_details(state: &AppState, track: &CatalogTrack) -> Result<Option<CatalogArtist>> {
    let Some(artist) = track.primary_artist() else {
        return Ok(None);
    };
    let Some(artist_id) = artist.id.as_deref() else {
        return Ok(None);
    };

    {
        let db = state.db.lock().await;
        if queries::find_artist_by_name(&db, &artist.name)?.is_some() {
            return Ok(None);
        }
    }

    match state.catalog().artist(artist_id).await {
        Ok(details) => Ok(details),
        Err(e) => {
            tracing::warn!(artist_id, error = %e, "Artist lookup failed, caching without genres");
            Ok(None)
        }
    }
}

/// POST /api/playlist/:id/songs
///
/// Adds a catalog track to the playlist, caching it locally first.
/// Adding a track that is already present is a no-op.
pub async fn add_song(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(body): Json<AddSongRequest>,
) -> Result<Json<PlaylistWithSongs>> {
    let external_id = body.song_id.trim();
    if external_id.is_empty() {
        return Err(AppError::BadRequest("songId is required".to_string()));
    }

    let catalog = state.catalog();
    let provider = catalog.name();

    // Check ownership and the local cache before going to the catalog
    let cached = {
        let db = state.db.lock().await;
        owned_playlist(&db, id, claims.sub)?;
        queries::find_song(&db, provider, external_id)?
    };

    let fetched = match cached {
        Some(_) => None,
        None => {
            let track = catalog
                .track(external_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Track {} not found", external_id)))?;
            let details = artist_details(&state, &track).await?;
            Some((track, details))
        }
    };

    let mut db = state.db.lock().await;
    let tx = db.transaction()?;

    // The playlist may have been deleted while the catalog was queried
    owned_playlist(&tx, id, claims.sub)?;

    let song = match (queries::find_song(&tx, provider, external_id)?, fetched) {
        (Some(song), _) => song,
        (None, Some((track, details))) => {
            if let Some(artist) = track.primary_artist() {
                queries::upsert_artist(&tx, artist, details.as_ref())?;
            }
            queries::upsert_song(&tx, provider, &track)?
        }
        (None, None) => {
            return Err(AppError::Internal(format!(
                "Cached song {} disappeared",
                external_id
            )))
        }
    };

    let added = queries::append_song(&tx, id, song.id)?;
    let playlist = owned_playlist(&tx, id, claims.sub)?;
    let result = queries::playlist_with_songs(&tx, playlist)?;
    tx.commit()?;

    if added {
        tracing::info!(playlist_id = id, song_id = song.id, external_id = %external_id, "Song added to playlist");
    } else {
        tracing::debug!(playlist_id = id, external_id = %external_id, "Song already in playlist");
    }

    Ok(Json(result))
}

/// DELETE /api/playlist/:id/songs/:song_id
///
/// `song_id` is the catalog (external) track id.
pub async fn remove_song(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, song_id)): Path<(i64, String)>,
) -> Result<Json<PlaylistWithSongs>> {
    let provider = state.catalog().name();

    let mut db = state.db.lock().await;
    let tx = db.transaction()?;

    owned_playlist(&tx, id, claims.sub)?;

    if !queries::remove_song(&tx, id, provider, &song_id)? {
        return Err(AppError::NotFound(format!(
            "Song {} is not in playlist {}",
            song_id, id
        )));
    }

    let playlist = owned_playlist(&tx, id, claims.sub)?;
    let result = queries::playlist_with_songs(&tx, playlist)?;
    tx.commit()?;

    tracing::info!(playlist_id = id, external_id = %song_id, "Song removed from playlist");

    Ok(Json(result))
}
