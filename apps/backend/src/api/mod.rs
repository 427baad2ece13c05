//! API endpoint handlers for the Cadence backend.

pub mod admin;
pub mod auth;
pub mod music;
pub mod playlists;
pub mod users;
