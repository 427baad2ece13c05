//! Spotify Web API catalog client.
//!
//! Authenticates with the client-credentials flow through a shared
//! [`TokenManager`]. A request rejected with 401 invalidates the token and is
//! retried once with a fresh one.

use async_trait::async_trait;
use chrono::Datelike;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::token::TokenManager;
use super::{
    AlbumRef, ArtistRef, CatalogArtist, CatalogProvider, CatalogTrack, SearchKind, SearchResults,
    REQUEST_TIMEOUT_SECS,
};
use crate::error::{AppError, Result};

/// Preferred image width for covers and artist pictures.
const PREFERRED_IMAGE_WIDTH: u32 = 64;

/// Spotify Web API client.
pub struct SpotifyClient {
    client: Client,
    api_url: String,
    market: String,
    tokens: Arc<TokenManager>,
}

impl SpotifyClient {
    pub fn new(
        api_url: impl Into<String>,
        market: impl Into<String>,
        tokens: Arc<TokenManager>,
    ) -> Result<Self> {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        if api_url.is_empty() {
            return Err(AppError::Internal(
                "Spotify API URL cannot be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url,
            market: market.into(),
            tokens,
        })
    }

    /// Create a new Spotify client wrapped in Arc for shared access.
    pub fn new_shared(
        api_url: impl Into<String>,
        market: impl Into<String>,
        tokens: Arc<TokenManager>,
    ) -> Result<Arc<Self>> {
        Ok(Arc::new(Self::new(api_url, market, tokens)?))
    }

    async fn search_tracks(&self, q: &str, limit: u32, offset: u32) -> Result<Vec<CatalogTrack>> {
        let params = [
            ("q", q.to_string()),
            ("type", "track".to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
            ("market", self.market.clone()),
        ];
        let response: SpSearch = self.get_with_params("/search", &params).await?;
        Ok(response
            .tracks
            .map(|page| page.into_items().map(CatalogTrack::from).collect())
            .unwrap_or_default())
    }

    async fn search_artist_page(
        &self,
        q: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<CatalogArtist>> {
        let params = [
            ("q", q.to_string()),
            ("type", "artist".to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ];
        let response: SpSearch = self.get_with_params("/search", &params).await?;
        Ok(response
            .artists
            .map(|page| page.into_items().map(CatalogArtist::from).collect())
            .unwrap_or_default())
    }

    /// Internal helper to perform authenticated GET requests with query parameters.
    async fn get_with_params<T, P>(&self, path: &str, params: &[P]) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
        P: serde::Serialize,
    {
        let url = format!("{}{}", self.api_url, path);
        let mut retried = false;

        loop {
            let token = self.tokens.access_token().await?;

            let response = self
                .client
                .get(&url)
                .bearer_auth(&token)
                .query(params)
                .send()
                .await
                .map_err(|e| {
                    tracing::warn!(path = %path, error = %e, "Spotify request failed");
                    if e.is_timeout() {
                        AppError::ServiceUnavailable("Spotify (timeout)".to_string())
                    } else {
                        AppError::ServiceUnavailable("Spotify".to_string())
                    }
                })?;

            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                self.tokens.invalidate(&token).await?;
                if retried {
                    tracing::warn!(path = %path, "Spotify rejected a freshly issued token");
                    return Err(AppError::ServiceUnavailable("Spotify".to_string()));
                }
                tracing::debug!(path = %path, "Spotify token rejected, retrying with a new one");
                retried = true;
                continue;
            }

            if status == StatusCode::NOT_FOUND {
                return Err(AppError::NotFound(format!(
                    "Spotify resource not found: {}",
                    path
                )));
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(AppError::RateLimited("Spotify".to_string()));
            }

            if !status.is_success() {
                tracing::warn!(path = %path, status = %status, "Spotify returned error status");
                return Err(AppError::ServiceUnavailable("Spotify".to_string()));
            }

            return response.json::<T>().await.map_err(|e| {
                AppError::Internal(format!(
                    "Failed to parse Spotify response from {}: {}",
                    path, e
                ))
            });
        }
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

/// Spotify ids are base62 strings.
fn is_spotify_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 64 && id.bytes().all(|b| b.is_ascii_alphanumeric())
}

#[async_trait]
impl CatalogProvider for SpotifyClient {
    fn name(&self) -> &'static str {
        "spotify"
    }

    async fn search(
        &self,
        query: &str,
        kind: SearchKind,
        limit: u32,
        offset: u32,
    ) -> Result<SearchResults> {
        tracing::debug!(query = %query, kind = ?kind, "Searching Spotify");

        match kind {
            SearchKind::Track => Ok(SearchResults::Tracks(
                self.search_tracks(query, limit, offset).await?,
            )),
            SearchKind::Album => {
                let q = format!("album:{}", query);
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
        tracing::debug!(track_id = %id, "Fetching Spotify track");

        if !is_spotify_id(id) {
            return Ok(None);
        }

        let params = [("market", self.market.as_str())];
        let track: Option<SpTrack> =
            optional(self.get_with_params(&format!("/tracks/{}", id), &params).await)?;
        Ok(track.map(CatalogTrack::from))
    }

    async fn top_tracks(&self, limit: u32) -> Result<Vec<CatalogTrack>> {
        // No public chart endpoint: approximate with this year's releases
        let year = chrono::Utc::now().year();
        tracing::debug!(year = year, limit = limit, "Fetching Spotify top tracks");

        self.search_tracks(&format!("year:{}", year), limit, 0).await
    }

    async fn artist(&self, id: &str) -> Result<Option<CatalogArtist>> {
        tracing::debug!(artist_id = %id, "Fetching Spotify artist");

        if !is_spotify_id(id) {
            return Ok(None);
        }

        let no_params: [(&str, &str); 0] = [];
        let artist: Option<SpArtist> =
            optional(self.get_with_params(&format!("/artists/{}", id), &no_params).await)?;
        Ok(artist.map(CatalogArtist::from))
    }

    async fn search_artists(&self, name: &str, limit: u32) -> Result<Vec<CatalogArtist>> {
        self.search_artist_page(name, limit, 0).await
    }

    async fn artist_top_tracks(&self, artist_id: &str, limit: u32) -> Result<Vec<CatalogTrack>> {
        tracing::debug!(artist_id = %artist_id, "Fetching Spotify artist top tracks");

        if !is_spotify_id(artist_id) {
            return Ok(Vec::new());
        }

        let params = [("market", self.market.as_str())];
        let response: SpTopTracks = self
            .get_with_params(&format!("/artists/{}/top-tracks", artist_id), &params)
            .await?;
        Ok(response
            .tracks
            .into_iter()
            .take(limit as usize)
            .map(CatalogTrack::from)
            .collect())
    }

    async fn radio(&self, track_id: &str, limit: u32) -> Result<Vec<CatalogTrack>> {
        let seed = self
            .track(track_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Track {} not found", track_id)))?;

        let Some(artist_id) = seed.primary_artist().and_then(|a| a.id.clone()) else {
            return Ok(Vec::new());
        };

        // Top tracks come back at most 10 at a time
        let tracks = self.artist_top_tracks(&artist_id, limit + 1).await?;
        Ok(tracks
            .into_iter()
            .filter(|t| t.id != seed.id)
            .take(limit as usize)
            .collect())
    }
}

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct SpSearch {
    tracks: Option<SpPaging<SpTrack>>,
    artists: Option<SpPaging<SpArtist>>,
}

#[derive(Debug, Deserialize)]
struct SpPaging<T> {
    // Search pages may hold null entries
    #[serde(default = "Vec::new")]
    items: Vec<Option<T>>,
}

impl<T> SpPaging<T> {
    fn into_items(self) -> impl Iterator<Item = T> {
        self.items.into_iter().flatten()
    }
}

#[derive(Debug, Deserialize)]
struct SpTopTracks {
    #[serde(default)]
    tracks: Vec<SpTrack>,
}

#[derive(Debug, Default, Deserialize)]
struct SpExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpImage {
    url: String,
    width: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SpArtistRef {
    id: Option<String>,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpAlbum {
    id: Option<String>,
    name: String,
    #[serde(default)]
    images: Vec<SpImage>,
    release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpTrack {
    id: String,
    name: String,
    duration_ms: Option<u64>,
    preview_url: Option<String>,
    #[serde(default)]
    external_urls: SpExternalUrls,
    #[serde(default)]
    artists: Vec<SpArtistRef>,
    album: Option<SpAlbum>,
}

#[derive(Debug, Deserialize)]
struct SpArtist {
    id: String,
    name: String,
    #[serde(default)]
    genres: Vec<String>,
    #[serde(default)]
    images: Vec<SpImage>,
    popularity: Option<u32>,
    #[serde(default)]
    external_urls: SpExternalUrls,
}

/// The 64px image if present, otherwise the smallest one.
fn pick_image(images: &[SpImage]) -> Option<String> {
    images
        .iter()
        .find(|img| img.width == Some(PREFERRED_IMAGE_WIDTH))
        .or_else(|| images.iter().min_by_key(|img| img.width.unwrap_or(u32::MAX)))
        .map(|img| img.url.clone())
}

impl From<SpTrack> for CatalogTrack {
    fn from(track: SpTrack) -> Self {
        let release_date = track.album.as_ref().and_then(|a| a.release_date.clone());

        CatalogTrack {
            id: track.id,
            title: track.name,
            artists: track
                .artists
                .into_iter()
                .map(|a| ArtistRef {
                    id: a.id,
                    name: a.name,
                    picture_url: None,
                })
                .collect(),
            album: track.album.map(|a| AlbumRef {
                cover_url: pick_image(&a.images),
                id: a.id,
                title: a.name,
            }),
            duration_secs: track
                .duration_ms
                .map(|ms| (ms / 1000).min(u32::MAX as u64) as u32),
            preview_url: track.preview_url.filter(|p| !p.is_empty()),
            link: track.external_urls.spotify,
            release_date,
        }
    }
}

impl From<SpArtist> for CatalogArtist {
    fn from(artist: SpArtist) -> Self {
        CatalogArtist {
            image_url: pick_image(&artist.images),
            id: artist.id,
            name: artist.name,
            genres: artist.genres,
            popularity: artist.popularity,
            link: artist.external_urls.spotify,
        }
    }
}
