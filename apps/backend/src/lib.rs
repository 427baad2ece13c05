//! Cadence Backend Library
//!
//! Music search, playlists and recommendations over an external catalog.
//! This library exposes modules for use in integration tests.

use axum::{response::Json, routing::get, Router};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod services;

use config::Config;
use services::{AuthService, CatalogProvider};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<Mutex<Connection>>,
    pub auth_service: Arc<AuthService>,
    pub catalog: Arc<dyn CatalogProvider>,
}

impl AppState {
    /// Get a reference to the auth service.
    pub fn auth_service(&self) -> &AuthService {
        &self.auth_service
    }

    /// Get a reference to the configured catalog provider.
    pub fn catalog(&self) -> &dyn CatalogProvider {
        self.catalog.as_ref()
    }
}

#[derive(Serialize)]
pub struct ApiResponse {
    pub message: String,
    pub version: String,
}

pub async fn health_check() -> Json<ApiResponse> {
    Json(ApiResponse {
        message: "Cadence backend is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Build the complete application router.
///
/// Layers such as CORS and request tracing are added by the binary.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", api::auth::router())
        .nest("/api/music", api::music::router(state.clone()))
        .nest("/api/playlist", api::playlists::router(state.clone()))
        .nest("/api/user", api::users::router(state.clone()))
        .nest("/api/admin", api::admin::router(state.clone()))
        .fallback(error::route_not_found)
        .with_state(state)
}
