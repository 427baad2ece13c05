//! SQL queries shared by the API handlers and services.
//!
//! Every function takes a plain `&Connection`, so callers can pass either a
//! connection or an open transaction.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{
    Artist, CatalogToken, Playlist, PlaylistWithSongs, Song, User, UserRole, ViewedTrack,
};
use crate::services::catalog::{ArtistRef, CatalogArtist, CatalogTrack};

/// Number of entries kept in a user's recently viewed list.
pub const VIEWED_TRACKS_LIMIT: usize = 10;

// =============================================================================
// Users
// =============================================================================

const USER_COLUMNS: &str = "id, username, email, password_hash, role, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: UserRole::from_db(&role),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

pub fn find_user_by_id(conn: &Connection, user_id: i64) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
        [user_id],
        user_from_row,
    )
    .optional()
}

pub fn find_user_by_email(conn: &Connection, email: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
        [email],
        user_from_row,
    )
    .optional()
}

/// Whether `email` belongs to a user other than `except_user_id`.
pub fn email_taken(
    conn: &Connection,
    email: &str,
    except_user_id: Option<i64>,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1 AND (?2 IS NULL OR id != ?2))",
        params![email, except_user_id],
        |row| row.get(0),
    )
}

pub fn insert_user(
    conn: &Connection,
    username: &str,
    email: &str,
    password_hash: &str,
    role: UserRole,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO users (username, email, password_hash, role) VALUES (?1, ?2, ?3, ?4)",
        params![username, email, password_hash, role.to_string()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Update the given profile fields, leaving `None` fields untouched.
pub fn update_user(
    conn: &Connection,
    user_id: i64,
    username: Option<&str>,
    email: Option<&str>,
    password_hash: Option<&str>,
) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        UPDATE users SET
            username = COALESCE(?2, username),
            email = COALESCE(?3, email),
            password_hash = COALESCE(?4, password_hash),
            updated_at = datetime('now')
        WHERE id = ?1
        "#,
        params![user_id, username, email, password_hash],
    )?;
    Ok(())
}

pub fn list_users(conn: &Connection) -> rusqlite::Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))?;
    let users = stmt
        .query_map([], user_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(users)
}

/// Returns true if a row was deleted.
pub fn delete_user(conn: &Connection, user_id: i64) -> rusqlite::Result<bool> {
    Ok(conn.execute("DELETE FROM users WHERE id = ?1", [user_id])? > 0)
}

// =============================================================================
// Songs and artists
// =============================================================================

const SONG_COLUMNS: &str =
    "s.id, s.provider, s.external_id, s.title, s.artist, s.album, s.cover_url, s.preview_url, s.duration_secs";

fn song_from_row(row: &Row<'_>) -> rusqlite::Result<Song> {
    Ok(Song {
        id: row.get(0)?,
        provider: row.get(1)?,
        external_id: row.get(2)?,
        title: row.get(3)?,
        artist: row.get(4)?,
        album: row.get(5)?,
        cover_url: row.get(6)?,
        preview_url: row.get(7)?,
        duration_secs: row.get(8)?,
    })
}

pub fn find_song(
    conn: &Connection,
    provider: &str,
    external_id: &str,
) -> rusqlite::Result<Option<Song>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM songs s WHERE s.provider = ?1 AND s.external_id = ?2",
            SONG_COLUMNS
        ),
        params![provider, external_id],
        song_from_row,
    )
    .optional()
}

/// Cache a catalog track. An existing row for the same identity is refreshed.
pub fn upsert_song(conn: &Connection, provider: &str, track: &CatalogTrack) -> rusqlite::Result<Song> {
    let artist = track.primary_artist().map(|a| a.name.as_str()).unwrap_or("Unknown artist");
    let album = track.album.as_ref().map(|a| a.title.as_str());
    let cover = track.album.as_ref().and_then(|a| a.cover_url.as_deref());

    conn.execute(
        r#"
        INSERT INTO songs (provider, external_id, title, artist, album, cover_url, preview_url, duration_secs)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT (provider, external_id) DO UPDATE SET
            title = excluded.title,
            artist = excluded.artist,
            album = excluded.album,
            cover_url = excluded.cover_url,
            preview_url = excluded.preview_url,
            duration_secs = excluded.duration_secs,
            updated_at = datetime('now')
        "#,
        params![
            provider,
            track.id,
            track.title,
            artist,
            album,
            cover,
            track.preview_url,
            track.duration_secs,
        ],
    )?;

    find_song(conn, provider, &track.id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

fn artist_from_row(row: &Row<'_>) -> rusqlite::Result<Artist> {
    let genres: String = row.get(3)?;
    Ok(Artist {
        id: row.get(0)?,
        name: row.get(1)?,
        external_id: row.get(2)?,
        genres: serde_json::from_str(&genres).unwrap_or_default(),
        image_url: row.get(4)?,
        popularity: row.get(5)?,
    })
}

pub fn find_artist_by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<Artist>> {
    conn.query_row(
        "SELECT id, name, external_id, genres, image_url, popularity FROM artists WHERE name = ?1",
        [name],
        artist_from_row,
    )
    .optional()
}

/// Record the artist of a cached song.
///
/// `details` comes from a full catalog lookup; when present its genres and
/// popularity replace the stored ones. An existing external id is kept.
pub fn upsert_artist(
    conn: &Connection,
    artist: &ArtistRef,
    details: Option<&CatalogArtist>,
) -> rusqlite::Result<()> {
    let external_id = artist
        .id
        .as_deref()
        .or_else(|| details.map(|d| d.id.as_str()));
    let image_url = details
        .and_then(|d| d.image_url.as_deref())
        .or(artist.picture_url.as_deref());
    let genres = details
        .map(|d| serde_json::to_string(&d.genres))
        .transpose()
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    let popularity = details.and_then(|d| d.popularity);

    conn.execute(
        r#"
        INSERT INTO artists (name, external_id, image_url, genres, popularity)
        VALUES (?1, ?2, ?3, COALESCE(?4, '[]'), COALESCE(?5, 0))
        ON CONFLICT (name) DO UPDATE SET
            external_id = COALESCE(artists.external_id, excluded.external_id),
            image_url = COALESCE(?3, artists.image_url),
            genres = COALESCE(?4, artists.genres),
            popularity = COALESCE(?5, artists.popularity),
            updated_at = datetime('now')
        "#,
        params![artist.name, external_id, image_url, genres, popularity],
    )?;
    Ok(())
}

// =============================================================================
// Playlists
// =============================================================================

fn playlist_from_row(row: &Row<'_>) -> rusqlite::Result<Playlist> {
    Ok(Playlist {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        owner_id: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub fn find_playlist(conn: &Connection, playlist_id: i64) -> rusqlite::Result<Option<Playlist>> {
    conn.query_row(
        "SELECT id, name, description, owner_id, created_at, updated_at FROM playlists WHERE id = ?1",
        [playlist_id],
        playlist_from_row,
    )
    .optional()
}

/// Songs of a playlist in playlist order.
pub fn playlist_songs(conn: &Connection, playlist_id: i64) -> rusqlite::Result<Vec<Song>> {
    let mut stmt = conn.prepare(&format!(
        r#"
        SELECT {} FROM playlist_songs ps
        JOIN songs s ON s.id = ps.song_id
        WHERE ps.playlist_id = ?1
        ORDER BY ps.position
        "#,
        SONG_COLUMNS
    ))?;
    let songs = stmt
        .query_map([playlist_id], song_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(songs)
}

pub fn playlist_with_songs(
    conn: &Connection,
    playlist: Playlist,
) -> rusqlite::Result<PlaylistWithSongs> {
    let songs = playlist_songs(conn, playlist.id)?;
    Ok(PlaylistWithSongs { playlist, songs })
}

pub fn playlists_for_owner(
    conn: &Connection,
    owner_id: i64,
) -> rusqlite::Result<Vec<PlaylistWithSongs>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, owner_id, created_at, updated_at FROM playlists WHERE owner_id = ?1 ORDER BY id",
    )?;
    let playlists = stmt
        .query_map([owner_id], playlist_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    playlists
        .into_iter()
        .map(|p| playlist_with_songs(conn, p))
        .collect()
}

pub fn insert_playlist(
    conn: &Connection,
    owner_id: i64,
    name: &str,
    description: Option<&str>,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO playlists (name, description, owner_id) VALUES (?1, ?2, ?3)",
        params![name, description, owner_id],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_playlist(
    conn: &Connection,
    playlist_id: i64,
    name: &str,
    description: Option<&str>,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE playlists SET name = ?1, description = ?2, updated_at = datetime('now') WHERE id = ?3",
        params![name, description, playlist_id],
    )?;
    Ok(())
}

pub fn delete_playlist(conn: &Connection, playlist_id: i64) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM playlists WHERE id = ?1", [playlist_id])?;
    Ok(())
}

/// Append a song to the end of a playlist.
///
/// Returns false if the song was already present.
pub fn append_song(conn: &Connection, playlist_id: i64, song_id: i64) -> rusqlite::Result<bool> {
    let inserted = conn.execute(
        r#"
        INSERT OR IGNORE INTO playlist_songs (playlist_id, song_id, position)
        VALUES (?1, ?2, (SELECT COALESCE(MAX(position) + 1, 0) FROM playlist_songs WHERE playlist_id = ?1))
        "#,
        params![playlist_id, song_id],
    )?;

    if inserted > 0 {
        touch_playlist(conn, playlist_id)?;
    }
    Ok(inserted > 0)
}

/// Remove a song (by external id) from a playlist and close the gap in positions.
///
/// Returns false if the song was not in the playlist.
pub fn remove_song(
    conn: &Connection,
    playlist_id: i64,
    provider: &str,
    external_id: &str,
) -> rusqlite::Result<bool> {
    let removed: Option<(i64, i64)> = conn
        .query_row(
            r#"
            SELECT ps.song_id, ps.position FROM playlist_songs ps
            JOIN songs s ON s.id = ps.song_id
            WHERE ps.playlist_id = ?1 AND s.provider = ?2 AND s.external_id = ?3
            "#,
            params![playlist_id, provider, external_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((song_id, position)) = removed else {
        return Ok(false);
    };

    conn.execute(
        "DELETE FROM playlist_songs WHERE playlist_id = ?1 AND song_id = ?2",
        params![playlist_id, song_id],
    )?;
    conn.execute(
        "UPDATE playlist_songs SET position = position - 1 WHERE playlist_id = ?1 AND position > ?2",
        params![playlist_id, position],
    )?;
    touch_playlist(conn, playlist_id)?;

    Ok(true)
}

fn touch_playlist(conn: &Connection, playlist_id: i64) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE playlists SET updated_at = datetime('now') WHERE id = ?1",
        [playlist_id],
    )?;
    Ok(())
}

// =============================================================================
// Viewed tracks
// =============================================================================

/// A user's recently viewed tracks, most recent first.
pub fn viewed_tracks(conn: &Connection, user_id: i64) -> rusqlite::Result<Vec<ViewedTrack>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT track_id, name, artists, album, release_date, image_url
        FROM viewed_tracks WHERE user_id = ?1
        ORDER BY id DESC
        LIMIT ?2
        "#,
    )?;
    let tracks = stmt
        .query_map(params![user_id, VIEWED_TRACKS_LIMIT as i64], |row| {
            Ok(ViewedTrack {
                id: row.get(0)?,
                name: row.get(1)?,
                artists: row.get(2)?,
                album: row.get(3)?,
                release_date: row.get(4)?,
                image_url: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tracks)
}

/// Push a track to the front of the user's history.
///
/// A track already in the history is left where it is. The history is
/// trimmed to [`VIEWED_TRACKS_LIMIT`] entries.
pub fn record_viewed_track(
    conn: &Connection,
    user_id: i64,
    track: &ViewedTrack,
) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        INSERT OR IGNORE INTO viewed_tracks (user_id, track_id, name, artists, album, release_date, image_url)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            user_id,
            track.id,
            track.name,
            track.artists,
            track.album,
            track.release_date,
            track.image_url,
        ],
    )?;

    conn.execute(
        r#"
        DELETE FROM viewed_tracks
        WHERE user_id = ?1 AND id NOT IN (
            SELECT id FROM viewed_tracks WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2
        )
        "#,
        params![user_id, VIEWED_TRACKS_LIMIT as i64],
    )?;
    Ok(())
}

// =============================================================================
// Catalog tokens
// =============================================================================

pub fn find_token(conn: &Connection, client_id: &str) -> rusqlite::Result<Option<CatalogToken>> {
    conn.query_row(
        "SELECT client_id, access_token, expires_at FROM catalog_tokens WHERE client_id = ?1",
        [client_id],
        |row| {
            Ok(CatalogToken {
                client_id: row.get(0)?,
                access_token: row.get(1)?,
                expires_at: row.get(2)?,
            })
        },
    )
    .optional()
}

/// Store a token, replacing any previous row for the same client id.
pub fn replace_token(conn: &Connection, token: &CatalogToken) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO catalog_tokens (client_id, access_token, expires_at) VALUES (?1, ?2, ?3)",
        params![token.client_id, token.access_token, token.expires_at],
    )?;
    Ok(())
}

pub fn delete_token(conn: &Connection, client_id: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM catalog_tokens WHERE client_id = ?1", [client_id])?;
    Ok(())
}
