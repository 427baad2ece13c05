//! Deezer catalog client.
//!
//! Deezer's public API needs no key. It reports most failures as HTTP 200 with
//! an `error` object in the body, so every response goes through [`DzEnvelope`].

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::{
    AlbumRef, ArtistRef, CatalogArtist, CatalogProvider, CatalogTrack, SearchKind, SearchResults,
    REQUEST_TIMEOUT_SECS,
};
use crate::error::{AppError, Result};

/// Deezer error code for "no data" (unknown id).
const DZ_ERROR_NO_DATA: i64 = 800;
/// Deezer error code for quota exceeded.
const DZ_ERROR_QUOTA: i64 = 4;

/// Deezer REST API client.
pub struct DeezerClient {
    client: Client,
    base_url: String,
}

impl DeezerClient {
    /// Create a new Deezer client against the given base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(AppError::Internal(
                "Deezer base URL cannot be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    /// Create a new Deezer client wrapped in Arc for shared access.
    pub fn new_shared(base_url: impl Into<String>) -> Result<Arc<Self>> {
        Ok(Arc::new(Self::new(base_url)?))
    }

    async fn search_tracks(&self, q: &str, limit: u32, offset: u32) -> Result<Vec<CatalogTrack>> {
        let params = [
            ("q", q.to_string()),
            ("limit", limit.to_string()),
            ("index", offset.to_string()),
        ];
        let page: DzPage<DzTrack> = self.get_with_params("/search/track", &params).await?;
        Ok(page.data.into_iter().map(CatalogTrack::from).collect())
    }

    async fn search_artist_page(
        &self,
        q: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<CatalogArtist>> {
        let params = [
            ("q", q.to_string()),
            ("limit", limit.to_string()),
            ("index", offset.to_string()),
        ];
        let page: DzPage<DzArtist> = self.get_with_params("/search/artist", &params).await?;
        Ok(page.data.into_iter().map(CatalogArtist::from).collect())
    }

    /// Internal helper to perform GET requests with query parameters and unwrap Deezer's envelope.
    async fn get_with_params<T, P>(&self, path: &str, params: &[P]) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
        P: serde::Serialize,
    {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(path = %path, error = %e, "Deezer request failed");
                if e.is_timeout() {
                    AppError::ServiceUnavailable("Deezer (timeout)".to_string())
                } else {
                    AppError::ServiceUnavailable("Deezer".to_string())
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!(
                "Deezer resource not found: {}",
                path
            )));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::RateLimited("Deezer".to_string()));
        }

        if !status.is_success() {
            tracing::warn!(path = %path, status = %status, "Deezer returned error status");
            return Err(AppError::ServiceUnavailable("Deezer".to_string()));
        }

        let envelope = response.json::<DzEnvelope<T>>().await.map_err(|e| {
            AppError::Internal(format!(
                "Failed to parse Deezer response from {}: {}",
                path, e
            ))
        })?;

        envelope.into_result(path)
    }
}

/// Treat a not-found error as an absent value.
fn optional<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(AppError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Deezer ids are numeric; anything else cannot exist.
fn is_deezer_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

#[async_trait]
impl CatalogProvider for DeezerClient {
    fn name(&self) -> &'static str {
        "deezer"
    }

    async fn search(
        &self,
        query: &str,
        kind: SearchKind,
        limit: u32,
        offset: u32,
    ) -> Result<SearchResults> {
        tracing::debug!(query = %query, kind = ?kind, "Searching Deezer");

        match kind {
            SearchKind::Track => Ok(SearchResults::Tracks(
                self.search_tracks(query, limit, offset).await?,
            )),
            SearchKind::Album => {
                let q = format!("album:\"{}\"", query.replace('"', ""));
                Ok(SearchResults::Tracks(
                    self.search_tracks(&q, limit, offset).await?,
                ))
            }
            SearchKind::Artist => Ok(SearchResults::Artists(
                self.search_artist_page(query, limit, offset).await?,
            )),
        }
    }

    async fn track(&self, id: &str) -> Result<Option<CatalogTrack>> {
        tracing::debug!(track_id = %id, "Fetching Deezer track");

        if !is_deezer_id(id) {
            return Ok(None);
        }

        let no_params: [(&str, &str); 0] = [];
        let track: Option<DzTrack> =
            optional(self.get_with_params(&format!("/track/{}", id), &no_params).await)?;
        Ok(track.map(CatalogTrack::from))
    }

    async fn top_tracks(&self, limit: u32) -> Result<Vec<CatalogTrack>> {
        tracing::debug!(limit = limit, "Fetching Deezer chart");

        let params = [("limit", limit.to_string())];
        let page: DzPage<DzTrack> = self.get_with_params("/chart/0/tracks", &params).await?;
        Ok(page.data.into_iter().map(CatalogTrack::from).collect())
    }

    async fn artist(&self, id: &str) -> Result<Option<CatalogArtist>> {
        tracing::debug!(artist_id = %id, "Fetching Deezer artist");

        if !is_deezer_id(id) {
            return Ok(None);
        }

        let no_params: [(&str, &str); 0] = [];
        let artist: Option<DzArtist> =
            optional(self.get_with_params(&format!("/artist/{}", id), &no_params).await)?;
        Ok(artist.map(CatalogArtist::from))
    }

    async fn search_artists(&self, name: &str, limit: u32) -> Result<Vec<CatalogArtist>> {
        self.search_artist_page(name, limit, 0).await
    }

    async fn artist_top_tracks(&self, artist_id: &str, limit: u32) -> Result<Vec<CatalogTrack>> {
        tracing::debug!(artist_id = %artist_id, "Fetching Deezer artist top tracks");

        if !is_deezer_id(artist_id) {
            return Ok(Vec::new());
        }

        let params = [("limit", limit.to_string())];
        let page: DzPage<DzTrack> = self
            .get_with_params(&format!("/artist/{}/top", artist_id), &params)
            .await?;
        Ok(page.data.into_iter().map(CatalogTrack::from).collect())
    }

    async fn radio(&self, track_id: &str, limit: u32) -> Result<Vec<CatalogTrack>> {
        let seed = self
            .track(track_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Track {} not found", track_id)))?;

        let Some(artist_id) = seed.primary_artist().and_then(|a| a.id.clone()) else {
            return Ok(Vec::new());
        };

        // One extra in case the seed comes back
        let params = [("limit", (limit + 1).to_string())];
        let page: DzPage<DzTrack> = self
            .get_with_params(&format!("/artist/{}/radio", artist_id), &params)
            .await?;

        Ok(page
            .data
            .into_iter()
            .map(CatalogTrack::from)
            .filter(|t| t.id != seed.id)
            .take(limit as usize)
            .collect())
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Either Deezer's error object or the expected payload.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DzEnvelope<T> {
    Error { error: DzError },
    Ok(T),
}

impl<T> DzEnvelope<T> {
    fn into_result(self, path: &str) -> Result<T> {
        match self {
            DzEnvelope::Ok(value) => Ok(value),
            DzEnvelope::Error { error } => match error.code {
                Some(DZ_ERROR_NO_DATA) => Err(AppError::NotFound(format!(
                    "Deezer resource not found: {}",
                    path
                ))),
                Some(DZ_ERROR_QUOTA) => Err(AppError::RateLimited("Deezer".to_string())),
                _ => {
                    tracing::warn!(
                        path = %path,
                        code = ?error.code,
                        message = ?error.message,
                        "Deezer API error"
                    );
                    Err(AppError::ServiceUnavailable("Deezer".to_string()))
                }
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct DzError {
    code: Option<i64>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DzPage<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct DzTrack {
    id: i64,
    title: String,
    duration: Option<u32>,
    preview: Option<String>,
    link: Option<String>,
    release_date: Option<String>,
    artist: Option<DzArtistRef>,
    album: Option<DzAlbumRef>,
}

#[derive(Debug, Deserialize)]
struct DzArtistRef {
    id: Option<i64>,
    name: String,
    picture_medium: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DzAlbumRef {
    id: Option<i64>,
    title: String,
    cover_medium: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DzArtist {
    id: i64,
    name: String,
    picture_medium: Option<String>,
    nb_fan: Option<u64>,
    link: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<DzTrack> for CatalogTrack {
    fn from(track: DzTrack) -> Self {
        CatalogTrack {
            id: track.id.to_string(),
            title: track.title,
            artists: track
                .artist
                .into_iter()
                .map(|a| ArtistRef {
                    id: a.id.map(|id| id.to_string()),
                    name: a.name,
                    picture_url: non_empty(a.picture_medium),
                })
                .collect(),
            album: track.album.map(|a| AlbumRef {
                id: a.id.map(|id| id.to_string()),
                title: a.title,
                cover_url: non_empty(a.cover_medium),
            }),
            duration_secs: track.duration,
            preview_url: non_empty(track.preview),
            link: non_empty(track.link),
            release_date: non_empty(track.release_date),
        }
    }
}

impl From<DzArtist> for CatalogArtist {
    fn from(artist: DzArtist) -> Self {
        CatalogArtist {
            id: artist.id.to_string(),
            name: artist.name,
            // Deezer does not expose artist genres
            genres: Vec::new(),
            image_url: non_empty(artist.picture_medium),
            // Fan count stands in for popularity, saturating at u32::MAX
            popularity: artist.nb_fan.map(|n| n.min(u32::MAX as u64) as u32),
            link: non_empty(artist.link),
        }
    }
}
