//! External music catalog access.
//!
//! A [`CatalogProvider`] hides whether tracks come from Deezer or Spotify.
//! Handlers only see the normalized [`CatalogTrack`] / [`CatalogArtist`] types.

pub mod deezer;
pub mod spotify;
pub mod token;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

pub use deezer::DeezerClient;
pub use spotify::SpotifyClient;
pub use token::{OAuthTokenEndpoint, SqliteTokenStore, TokenEndpoint, TokenManager, TokenStore};

/// Per-request timeout for catalog HTTP calls.
pub(crate) const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Artist as referenced from a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: Option<String>,
    pub name: String,
    pub picture_url: Option<String>,
}

/// Album as referenced from a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumRef {
    pub id: Option<String>,
    pub title: String,
    pub cover_url: Option<String>,
}

/// A track as returned by the external catalog, normalized across providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogTrack {
    pub id: String,
    pub title: String,
    pub artists: Vec<ArtistRef>,
    pub album: Option<AlbumRef>,
    pub duration_secs: Option<u32>,
    /// URL of a 30 second audio preview
    pub preview_url: Option<String>,
    /// Link to the track on the provider's site
    pub link: Option<String>,
    pub release_date: Option<String>,
}

impl CatalogTrack {
    /// The first credited artist.
    pub fn primary_artist(&self) -> Option<&ArtistRef> {
        self.artists.first()
    }
}

/// An artist as returned by the external catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogArtist {
    pub id: String,
    pub name: String,
    pub genres: Vec<String>,
    pub image_url: Option<String>,
    pub popularity: Option<u32>,
    pub link: Option<String>,
}

/// What a search should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Track,
    Artist,
    Album,
}

impl SearchKind {
    /// Parse the `type` query parameter. `name` and `song` are accepted for tracks.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "track" | "tracks" | "name" | "song" => Ok(SearchKind::Track),
            "artist" | "artists" => Ok(SearchKind::Artist),
            "album" | "albums" => Ok(SearchKind::Album),
            other => Err(AppError::BadRequest(format!(
                "Unknown search type '{}', expected track, artist or album",
                other
            ))),
        }
    }
}

/// Search results, tagged by what they contain.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "items", rename_all = "lowercase")]
pub enum SearchResults {
    Tracks(Vec<CatalogTrack>),
    Artists(Vec<CatalogArtist>),
}

impl SearchResults {
    pub fn len(&self) -> usize {
        match self {
            SearchResults::Tracks(items) => items.len(),
            SearchResults::Artists(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read access to an external music catalog.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Short provider name stored alongside cached songs (e.g. "deezer").
    fn name(&self) -> &'static str;

    /// Search tracks or artists. Album searches return the album's tracks.
    async fn search(
        &self,
        query: &str,
        kind: SearchKind,
        limit: u32,
        offset: u32,
    ) -> Result<SearchResults>;

    /// Fetch a single track. `Ok(None)` if the catalog does not know the id.
    async fn track(&self, id: &str) -> Result<Option<CatalogTrack>>;

    /// Currently popular tracks.
    async fn top_tracks(&self, limit: u32) -> Result<Vec<CatalogTrack>>;

    /// Fetch a single artist. `Ok(None)` if the catalog does not know the id.
    async fn artist(&self, id: &str) -> Result<Option<CatalogArtist>>;

    /// Search artists by name, best match first.
    async fn search_artists(&self, name: &str, limit: u32) -> Result<Vec<CatalogArtist>>;

    /// An artist's most popular tracks.
    async fn artist_top_tracks(&self, artist_id: &str, limit: u32) -> Result<Vec<CatalogTrack>>;

    /// "Radio" style recommendations seeded by a track. The seed is never included.
    async fn radio(&self, track_id: &str, limit: u32) -> Result<Vec<CatalogTrack>>;
}
