//! Recommendations built on top of a [`CatalogProvider`].

use futures::future::join_all;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::services::catalog::{CatalogArtist, CatalogProvider, CatalogTrack};

/// Maximum number of similar tracks returned for a seed track.
pub const SIMILAR_LIMIT: usize = 5;
pub const RADIO_DEFAULT_LIMIT: u32 = 10;
pub const RADIO_MAX_LIMIT: u32 = 50;

const HOME_TOP_TRACKS: u32 = 10;
const HOME_ARTISTS: usize = 5;
const HOME_GENRES: usize = 5;

/// Tracks by the same artist as `track_id`, excluding the track itself.
pub async fn similar_tracks(
    catalog: &dyn CatalogProvider,
    track_id: &str,
) -> Result<Vec<CatalogTrack>> {
    let seed = catalog
        .track(track_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Track {} not found", track_id)))?;

    let artist = seed
        .primary_artist()
        .ok_or_else(|| AppError::NotFound(format!("Track {} has no artist", track_id)))?;

    let artist_id = match &artist.id {
        Some(id) => id.clone(),
        None => catalog
            .search_artists(&artist.name, 1)
            .await?
            .into_iter()
            .next()
            .map(|a| a.id)
            .ok_or_else(|| AppError::NotFound(format!("Artist {} not found", artist.name)))?,
    };

    let tracks = catalog
        .artist_top_tracks(&artist_id, SIMILAR_LIMIT as u32 + 1)
        .await?;

    Ok(tracks
        .into_iter()
        .filter(|t| t.id != seed.id)
        .take(SIMILAR_LIMIT)
        .collect())
}

/// Clamp a requested radio size to `1..=RADIO_MAX_LIMIT`.
pub fn radio_limit(requested: Option<u32>) -> u32 {
    requested
        .unwrap_or(RADIO_DEFAULT_LIMIT)
        .clamp(1, RADIO_MAX_LIMIT)
}

/// Catalog part of the home screen.
#[derive(Debug, Clone, Serialize)]
pub struct HomeFeed {
    pub top_tracks: Vec<CatalogTrack>,
    pub artists: Vec<CatalogArtist>,
    pub genres: Vec<String>,
}

/// Top tracks plus the artists behind them and their genres.
///
/// Artist lookups run concurrently; one that fails is left out.
pub async fn home_feed(catalog: &dyn CatalogProvider) -> Result<HomeFeed> {
    let top_tracks = catalog.top_tracks(HOME_TOP_TRACKS).await?;

    let mut artist_ids: Vec<&str> = Vec::new();
    for id in top_tracks
        .iter()
        .filter_map(|t| t.primary_artist().and_then(|a| a.id.as_deref()))
    {
        if !artist_ids.contains(&id) {
            artist_ids.push(id);
        }
        if artist_ids.len() == HOME_ARTISTS {
            break;
        }
    }

    let lookups = join_all(artist_ids.iter().map(|id| catalog.artist(id))).await;

    let mut artists = Vec::with_capacity(lookups.len());
    for (id, result) in artist_ids.iter().zip(lookups) {
        match result {
            Ok(Some(artist)) => artists.push(artist),
            Ok(None) => tracing::debug!(artist_id = %id, "Home artist not found, skipping"),
            Err(e) => tracing::warn!(artist_id = %id, error = %e, "Home artist lookup failed"),
        }
    }

    let mut genres: Vec<String> = Vec::new();
    for genre in artists.iter().flat_map(|a| a.genres.iter()) {
        if genres.len() == HOME_GENRES {
            break;
        }
        if !genres.contains(genre) {
            genres.push(genre.clone());
        }
    }

    Ok(HomeFeed {
        top_tracks,
        artists,
        genres,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::{ArtistRef, SearchKind, SearchResults};
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn track(id: &str, artist_id: Option<&str>, artist: &str) -> CatalogTrack {
        CatalogTrack {
            id: id.to_string(),
            title: format!("Track {}", id),
            artists: vec![ArtistRef {
                id: artist_id.map(str::to_string),
                name: artist.to_string(),
                picture_url: None,
            }],
            album: None,
            duration_secs: None,
            preview_url: None,
            link: None,
            release_date: None,
        }
    }

    fn artist(id: &str, genres: &[&str]) -> CatalogArtist {
        CatalogArtist {
            id: id.to_string(),
            name: format!("Artist {}", id),
            genres: genres.iter().map(|g| g.to_string()).collect(),
            image_url: None,
            popularity: None,
            link: None,
        }
    }

    #[derive(Default)]
    struct StubCatalog {
        tracks: HashMap<String, CatalogTrack>,
        artists: HashMap<String, CatalogArtist>,
        top: Vec<CatalogTrack>,
        by_artist: HashMap<String, Vec<CatalogTrack>>,
        failing_artists: Vec<String>,
    }

    #[async_trait]
    impl CatalogProvider for StubCatalog {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn search(&self, _: &str, _: SearchKind, _: u32, _: u32) -> Result<SearchResults> {
            Ok(SearchResults::Tracks(Vec::new()))
        }

        async fn track(&self, id: &str) -> Result<Option<CatalogTrack>> {
            Ok(self.tracks.get(id).cloned())
        }

        async fn top_tracks(&self, limit: u32) -> Result<Vec<CatalogTrack>> {
            Ok(self.top.iter().take(limit as usize).cloned().collect())
        }

        async fn artist(&self, id: &str) -> Result<Option<CatalogArtist>> {
            if self.failing_artists.iter().any(|f| f == id) {
                return Err(AppError::ServiceUnavailable("stub".to_string()));
            }
            Ok(self.artists.get(id).cloned())
        }

        async fn search_artists(&self, name: &str, _: u32) -> Result<Vec<CatalogArtist>> {
            Ok(self
                .artists
                .values()
                .filter(|a| a.name == name)
                .cloned()
                .collect())
        }

        async fn artist_top_tracks(&self, artist_id: &str, limit: u32) -> Result<Vec<CatalogTrack>> {
            Ok(self
                .by_artist
                .get(artist_id)
                .map(|t| t.iter().take(limit as usize).cloned().collect())
                .unwrap_or_default())
        }

        async fn radio(&self, _: &str, _: u32) -> Result<Vec<CatalogTrack>> {
            Ok(Vec::new())
        }
    }

    fn catalog_with_discography() -> StubCatalog {
        let mut catalog = StubCatalog::default();
        let songs: Vec<CatalogTrack> = (1..=8)
            .map(|i| track(&i.to_string(), Some("27"), "Daft Punk"))
            .collect();
        for song in &songs {
            catalog.tracks.insert(song.id.clone(), song.clone());
        }
        catalog.by_artist.insert("27".to_string(), songs);
        catalog.artists.insert("27".to_string(), artist("27", &["electro"]));
        catalog
    }

    #[tokio::test]
    async fn test_similar_excludes_seed_and_caps_at_five() {
        let catalog = catalog_with_discography();

        let similar = similar_tracks(&catalog, "2").await.unwrap();

        assert_eq!(similar.len(), SIMILAR_LIMIT);
        assert!(similar.iter().all(|t| t.id != "2"));
    }

    #[tokio::test]
    async fn test_similar_falls_back_to_artist_name_search() {
        let mut catalog = catalog_with_discography();
        catalog
            .tracks
            .insert("99".to_string(), track("99", None, "Artist 27"));

        let similar = similar_tracks(&catalog, "99").await.unwrap();

        assert_eq!(similar.len(), SIMILAR_LIMIT);
    }

    #[tokio::test]
    async fn test_similar_unknown_track_is_not_found() {
        let catalog = catalog_with_discography();

        assert!(matches!(
            similar_tracks(&catalog, "404").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_similar_track_without_artist_is_not_found() {
        let mut catalog = StubCatalog::default();
        let mut lonely = track("1", None, "x");
        lonely.artists.clear();
        catalog.tracks.insert("1".to_string(), lonely);

        assert!(matches!(
            similar_tracks(&catalog, "1").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_radio_limit_bounds() {
        assert_eq!(radio_limit(None), RADIO_DEFAULT_LIMIT);
        assert_eq!(radio_limit(Some(0)), 1);
        assert_eq!(radio_limit(Some(500)), RADIO_MAX_LIMIT);
        assert_eq!(radio_limit(Some(20)), 20);
    }

    #[tokio::test]
    async fn test_home_feed_collects_distinct_artists_and_genres() {
        let mut catalog = StubCatalog::default();
        catalog.top = vec![
            track("1", Some("a"), "A"),
            track("2", Some("a"), "A"),
            track("3", Some("b"), "B"),
            track("4", Some("c"), "C"),
            track("5", None, "Nobody"),
        ];
        catalog.artists.insert("a".to_string(), artist("a", &["pop", "dance"]));
        catalog.artists.insert("b".to_string(), artist("b", &["pop", "rock"]));
        catalog.failing_artists.push("c".to_string());

        let feed = home_feed(&catalog).await.unwrap();

        assert_eq!(feed.top_tracks.len(), 5);
        let ids: Vec<_> = feed.artists.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(feed.genres, vec!["pop", "dance", "rock"]);
    }

    #[tokio::test]
    async fn test_home_feed_limits_artists_and_genres() {
        let mut catalog = StubCatalog::default();
        for i in 0..8 {
            let id = format!("artist-{}", i);
            catalog.top.push(track(&i.to_string(), Some(id.as_str()), &id));
            let genres = [format!("g{}a", i), format!("g{}b", i)];
            let genre_refs: Vec<&str> = genres.iter().map(String::as_str).collect();
            catalog.artists.insert(id.clone(), artist(&id, &genre_refs));
        }

        let feed = home_feed(&catalog).await.unwrap();

        assert_eq!(feed.top_tracks.len(), 8);
        assert_eq!(feed.artists.len(), HOME_ARTISTS);
        assert_eq!(feed.genres.len(), HOME_GENRES);
    }
}
