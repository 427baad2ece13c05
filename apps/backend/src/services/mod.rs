//! Application services for the Cadence backend.

pub mod auth;
pub mod catalog;
pub mod recommend;

pub use auth::{AuthService, Claims};
pub use catalog::{CatalogProvider, DeezerClient, SpotifyClient, TokenManager};
