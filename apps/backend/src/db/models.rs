use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Author,
    Admin,
}

impl UserRole {
    /// Parse a role column value. Unknown values degrade to `User`.
    pub fn from_db(value: &str) -> Self {
        match value {
            "admin" => UserRole::Admin,
            "author" => UserRole::Author,
            _ => UserRole::User,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::User => write!(f, "user"),
            UserRole::Author => write!(f, "author"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub created_at: String,
    pub updated_at: String,
}

/// User as returned to clients (never carries the password hash).
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// A catalog track cached locally so playlists can reference it.
#[derive(Debug, Clone, Serialize)]
pub struct Song {
    pub id: i64,
    pub provider: String,
    pub external_id: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub cover_url: Option<String>,
    pub preview_url: Option<String>,
    pub duration_secs: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaylistWithSongs {
    #[serde(flatten)]
    pub playlist: Playlist,
    pub songs: Vec<Song>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Artist {
    pub id: i64,
    pub name: String,
    pub external_id: Option<String>,
    pub genres: Vec<String>,
    pub image_url: Option<String>,
    pub popularity: u32,
}

/// Entry of a user's recently viewed tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewedTrack {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artists: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default, alias = "releaseDate")]
    pub release_date: Option<String>,
    #[serde(default, alias = "imageUrl")]
    pub image_url: Option<String>,
}

/// Cached access token for an external catalog client id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogToken {
    pub client_id: String,
    pub access_token: String,
    /// Unix timestamp (seconds)
    pub expires_at: i64,
}
