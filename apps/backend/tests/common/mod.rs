//! Test infrastructure for Cadence backend integration tests.
//!
//! Provides a `TestApp` wrapper around `axum_test::TestServer` with helper methods
//! for creating users, generating auth tokens, and making authenticated requests.
//! The external catalog is replaced by an in-process [`FakeCatalog`].

use async_trait::async_trait;
use axum_test::TestServer;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use cadence::db::{self, models::UserRole, queries};
use cadence::error::{AppError, Result};
use cadence::services::catalog::{
    AlbumRef, ArtistRef, CatalogArtist, CatalogProvider, CatalogTrack, SearchKind, SearchResults,
};
use cadence::services::AuthService;
use cadence::{build_router, config::Config, AppState};

pub const DAFT_PUNK_ID: &str = "27";
/// Artist referenced by tracks but unknown to the catalog.
pub const GHOST_ARTIST_ID: &str = "666";
/// Track with no audio preview.
pub const SILENT_TRACK_ID: &str = "900";

/// In-memory catalog with a small fixed discography.
pub struct FakeCatalog {
    tracks: BTreeMap<String, CatalogTrack>,
    artists: BTreeMap<String, CatalogArtist>,
    track_lookups: AtomicUsize,
    artist_lookups: AtomicUsize,
}

fn fake_track(id: &str, title: &str, artist_id: &str, artist_name: &str, album: &str) -> CatalogTrack {
    CatalogTrack {
        id: id.to_string(),
        title: title.to_string(),
        artists: vec![ArtistRef {
            id: Some(artist_id.to_string()),
            name: artist_name.to_string(),
            picture_url: Some(format!("https://img.example/artist/{}.jpg", artist_id)),
        }],
        album: Some(AlbumRef {
            id: None,
            title: album.to_string(),
            cover_url: Some(format!("https://img.example/album/{}.jpg", id)),
        }),
        duration_secs: Some(200),
        preview_url: Some(format!("https://cdn.example/preview/{}.mp3", id)),
        link: None,
        release_date: Some("2001-03-07".to_string()),
    }
}

impl FakeCatalog {
    pub fn new() -> Self {
        let mut tracks = BTreeMap::new();
        let discovery = [
            ("101", "One More Time"),
            ("102", "Aerodynamic"),
            ("103", "Digital Love"),
            ("104", "Harder, Better, Faster, Stronger"),
            ("105", "Crescendolls"),
            ("106", "Nightvision"),
            ("107", "Superheroes"),
        ];
        for (id, title) in discovery {
            tracks.insert(
                id.to_string(),
                fake_track(id, title, DAFT_PUNK_ID, "Daft Punk", "Discovery"),
            );
        }
        tracks.insert(
            "201".to_string(),
            fake_track("201", "Unknown Pleasures", GHOST_ARTIST_ID, "Ghost", "Nowhere"),
        );
        let mut silent = fake_track(SILENT_TRACK_ID, "Silence", DAFT_PUNK_ID, "Daft Punk", "Quiet");
        silent.preview_url = None;
        tracks.insert(SILENT_TRACK_ID.to_string(), silent);

        let mut artists = BTreeMap::new();
        artists.insert(
            DAFT_PUNK_ID.to_string(),
            CatalogArtist {
                id: DAFT_PUNK_ID.to_string(),
                name: "Daft Punk".to_string(),
                genres: vec!["electro".to_string(), "french house".to_string()],
                image_url: Some("https://img.example/artist/27.jpg".to_string()),
                popularity: Some(80),
                link: None,
            },
        );

        Self {
            tracks,
            artists,
            track_lookups: AtomicUsize::new(0),
            artist_lookups: AtomicUsize::new(0),
        }
    }

    /// Number of `track()` calls served so far.
    #[allow(dead_code)]
    pub fn track_lookups(&self) -> usize {
        self.track_lookups.load(Ordering::SeqCst)
    }

    /// Number of `artist()` calls served so far.
    #[allow(dead_code)]
    pub fn artist_lookups(&self) -> usize {
        self.artist_lookups.load(Ordering::SeqCst)
    }

    fn by_artist(&self, artist_id: &str) -> Vec<CatalogTrack> {
        self.tracks
            .values()
            .filter(|t| t.primary_artist().and_then(|a| a.id.as_deref()) == Some(artist_id))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CatalogProvider for FakeCatalog {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn search(
        &self,
        query: &str,
        kind: SearchKind,
        limit: u32,
        offset: u32,
    ) -> Result<SearchResults> {
        let needle = query.to_lowercase();
        let page = |items: Vec<CatalogTrack>| -> Vec<CatalogTrack> {
            items
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect()
        };

        Ok(match kind {
            SearchKind::Track => SearchResults::Tracks(page(
                self.tracks
                    .values()
                    .filter(|t| t.title.to_lowercase().contains(&needle))
                    .cloned()
                    .collect(),
            )),
            SearchKind::Album => SearchResults::Tracks(page(
                self.tracks
                    .values()
                    .filter(|t| {
                        t.album
                            .as_ref()
                            .is_some_and(|a| a.title.to_lowercase().contains(&needle))
                    })
                    .cloned()
                    .collect(),
            )),
            SearchKind::Artist => SearchResults::Artists(
                self.artists
                    .values()
                    .filter(|a| a.name.to_lowercase().contains(&needle))
                    .skip(offset as usize)
                    .take(limit as usize)
                    .cloned()
                    .collect(),
            ),
        })
    }

    async fn track(&self, id: &str) -> Result<Option<CatalogTrack>> {
        self.track_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.tracks.get(id).cloned())
    }

    async fn top_tracks(&self, limit: u32) -> Result<Vec<CatalogTrack>> {
        Ok(self.tracks.values().take(limit as usize).cloned().collect())
    }

    async fn artist(&self, id: &str) -> Result<Option<CatalogArtist>> {
        self.artist_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.artists.get(id).cloned())
    }

    async fn search_artists(&self, name: &str, limit: u32) -> Result<Vec<CatalogArtist>> {
        Ok(self
            .artists
            .values()
            .filter(|a| a.name.eq_ignore_ascii_case(name))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn artist_top_tracks(&self, artist_id: &str, limit: u32) -> Result<Vec<CatalogTrack>> {
        Ok(self
            .by_artist(artist_id)
            .into_iter()
            .take(limit as usize)
            .collect())
    }

    async fn radio(&self, track_id: &str, limit: u32) -> Result<Vec<CatalogTrack>> {
        if !self.tracks.contains_key(track_id) {
            return Err(AppError::NotFound(format!("Track {} not found", track_id)));
        }
        Ok(self
            .tracks
            .values()
            .filter(|t| t.id != track_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

/// Test application wrapper around axum_test::TestServer.
pub struct TestApp {
    server: TestServer,
    db: Arc<Mutex<Connection>>,
    auth_service: Arc<AuthService>,
    catalog: Arc<FakeCatalog>,
}

impl TestApp {
    /// Create a new test application with an in-memory database and the fake catalog.
    pub async fn new() -> Self {
        let conn = db::init_db_memory().expect("Failed to initialize test database");
        let db = Arc::new(Mutex::new(conn));

        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.server.jwt_secret = Some("test-jwt-secret-for-integration-tests".to_string());
        config.database.path = ":memory:".into();

        let auth_service = Arc::new(AuthService::new(
            "test-jwt-secret-for-integration-tests".to_string(),
        ));

        let catalog = Arc::new(FakeCatalog::new());

        let state = AppState {
            config: Arc::new(config),
            db: Arc::clone(&db),
            auth_service: Arc::clone(&auth_service),
            catalog: catalog.clone(),
        };

        let server = TestServer::new(build_router(state)).expect("Failed to create test server");

        Self {
            server,
            db,
            auth_service,
            catalog,
        }
    }

    pub fn server(&self) -> &TestServer {
        &self.server
    }

    /// Get a reference to the database connection.
    ///
    /// Useful for seeding test data or verifying database state.
    #[allow(dead_code)]
    pub fn db(&self) -> &Arc<Mutex<Connection>> {
        &self.db
    }

    #[allow(dead_code)]
    pub fn auth_service(&self) -> &Arc<AuthService> {
        &self.auth_service
    }

    #[allow(dead_code)]
    pub fn catalog(&self) -> &FakeCatalog {
        &self.catalog
    }

    /// Create a test user in the database and return its id.
    pub async fn create_test_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: UserRole,
    ) -> i64 {
        let password_hash = self
            .auth_service
            .hash_password(password)
            .expect("Failed to hash password");

        let db = self.db.lock().await;
        queries::insert_user(&db, username, email, &password_hash, role)
            .expect("Failed to create test user")
    }

    /// Generate a JWT token for the given user.
    pub fn get_auth_token(&self, user_id: i64, role: UserRole) -> String {
        self.auth_service
            .create_token(user_id, role)
            .expect("Failed to create token")
    }

    /// Create an Authorization header tuple for use with HTTP requests.
    pub fn auth_header(&self, token: &str) -> (axum::http::HeaderName, axum::http::HeaderValue) {
        use axum::http::{header::AUTHORIZATION, HeaderValue};
        (
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).expect("Invalid token format"),
        )
    }

    /// Create a test admin user and return their ID and auth token.
    #[allow(dead_code)]
    pub async fn create_admin(&self) -> (i64, String) {
        let user_id = self
            .create_test_user("admin", "admin@example.com", "adminpass", UserRole::Admin)
            .await;
        let token = self.get_auth_token(user_id, UserRole::Admin);
        (user_id, token)
    }

    /// Create a test regular user and return their ID and auth token.
    #[allow(dead_code)]
    pub async fn create_user(&self) -> (i64, String) {
        self.create_named_user("testuser").await
    }

    /// Create a regular user `<name>@example.com` and return their ID and auth token.
    #[allow(dead_code)]
    pub async fn create_named_user(&self, name: &str) -> (i64, String) {
        let user_id = self
            .create_test_user(
                name,
                &format!("{}@example.com", name),
                "userpass123",
                UserRole::User,
            )
            .await;
        let token = self.get_auth_token(user_id, UserRole::User);
        (user_id, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_app_creation() {
        let app = TestApp::new().await;
        assert!(app.db.lock().await.is_autocommit());
    }

    #[tokio::test]
    async fn test_create_test_user() {
        let app = TestApp::new().await;
        let user_id = app
            .create_test_user("testuser", "test@example.com", "pass12345", UserRole::User)
            .await;
        assert!(user_id > 0);

        let db = app.db.lock().await;
        let user = queries::find_user_by_id(&db, user_id)
            .unwrap()
            .expect("User not found");
        assert_eq!(user.username, "testuser");
        assert_eq!(user.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_create_admin_helper() {
        let app = TestApp::new().await;
        let (admin_id, admin_token) = app.create_admin().await;

        assert!(admin_id > 0);
        let claims = app
            .auth_service
            .verify_token(&admin_token)
            .expect("Token should be valid");
        assert_eq!(claims.role, UserRole::Admin);
    }

    #[tokio::test]
    async fn test_auth_header() {
        let app = TestApp::new().await;
        let token = app.get_auth_token(1, UserRole::User);
        let (name, value) = app.auth_header(&token);

        assert_eq!(name, axum::http::header::AUTHORIZATION);
        assert_eq!(value.to_str().unwrap(), format!("Bearer {}", token).as_str());
    }

    #[tokio::test]
    async fn test_health_check_endpoint() {
        let app = TestApp::new().await;
        let response = app.server().get("/health").await;

        response.assert_status_ok();
        response.assert_json_contains(&serde_json::json!({
            "message": "Cadence backend is running"
        }));
    }
}
