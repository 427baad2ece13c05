use axum::http::{header, Method};
use rand::Rng;
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cadence::config::{CatalogProviderKind, Config};
use cadence::db::{self, models::UserRole, queries};
use cadence::error::{self, AppError};
use cadence::services::catalog::{OAuthTokenEndpoint, SqliteTokenStore};
use cadence::services::{AuthService, CatalogProvider, DeezerClient, SpotifyClient, TokenManager};
use cadence::{build_router, AppState};

const DEFAULT_ADMIN_EMAIL: &str = "admin@cadence.local";

fn init_tracing() {
    // RUST_LOG overrides the default filter
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cadence=debug,tower_http=debug,axum=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Ensure an admin user exists.
fn ensure_admin_user(conn: &Connection, auth_service: &AuthService) {
    let admin_exists: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE role = 'admin')",
            [],
            |row| row.get(0),
        )
        .unwrap_or(false);

    if admin_exists {
        tracing::debug!("Admin user already exists");
        return;
    }

    let admin_password = std::env::var("CADENCE_ADMIN_PASSWORD").unwrap_or_else(|_| {
        let password = random_alphanumeric(16);
        tracing::warn!("Generated admin password: {}", password);
        tracing::warn!("Set CADENCE_ADMIN_PASSWORD environment variable to use a fixed password");
        password
    });
    let admin_email =
        std::env::var("CADENCE_ADMIN_EMAIL").unwrap_or_else(|_| DEFAULT_ADMIN_EMAIL.to_string());

    let password_hash = match auth_service.hash_password(&admin_password) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!("Failed to hash admin password: {}", e);
            return;
        }
    };

    match queries::insert_user(conn, "admin", &admin_email, &password_hash, UserRole::Admin) {
        Ok(_) => tracing::info!(email = %admin_email, "Created default admin user"),
        Err(e) => tracing::error!("Failed to create admin user: {}", e),
    }
}

/// Build the catalog provider selected in the configuration.
fn build_catalog(
    config: &Config,
    db: &Arc<Mutex<Connection>>,
) -> Result<Arc<dyn CatalogProvider>, AppError> {
    match config.catalog.provider {
        CatalogProviderKind::Deezer => {
            let client: Arc<dyn CatalogProvider> =
                DeezerClient::new_shared(config.catalog.deezer.base_url.clone())?;
            Ok(client)
        }
        CatalogProviderKind::Spotify => {
            let spotify = &config.catalog.spotify;
            let tokens = Arc::new(TokenManager::new(
                spotify.credentials.clone(),
                Arc::new(SqliteTokenStore::new(Arc::clone(db))),
                Arc::new(OAuthTokenEndpoint::new(spotify.token_url.clone())?),
            ));
            tracing::info!(
                credentials = tokens.credential_count(),
                "Spotify token manager initialized"
            );
            let client: Arc<dyn CatalogProvider> = SpotifyClient::new_shared(
                spotify.api_url.clone(),
                spotify.market.clone(),
                tokens,
            )?;
            Ok(client)
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing first so we can log configuration loading
    init_tracing();

    tracing::info!("Starting Cadence backend v{}", env!("CARGO_PKG_VERSION"));

    let config = match Config::load() {
        Ok(cfg) => {
            tracing::info!("Configuration loaded successfully");
            tracing::debug!("Server: {}:{}", cfg.server.host, cfg.server.port);
            tracing::debug!("Database: {:?}", cfg.database.path);
            tracing::debug!("Catalog provider: {}", cfg.catalog.provider);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    error::set_expose_internal_details(!config.is_production());

    // Ensure database directory exists
    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::error!("Failed to create database directory: {}", e);
                std::process::exit(1);
            }
        }
    }

    let conn = match db::init_db(&config.database.path) {
        Ok(conn) => {
            tracing::info!("Database initialized at {:?}", config.database.path);
            conn
        }
        Err(e) => {
            tracing::error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    // Get JWT secret, generating one if not configured (development mode)
    let jwt_secret = config.server.jwt_secret.clone().unwrap_or_else(|| {
        tracing::warn!("No JWT secret configured, using random secret");
        tracing::warn!("Set CADENCE_SERVER__JWT_SECRET for production use");
        random_alphanumeric(32)
    });

    let auth_service = AuthService::with_ttl(jwt_secret, config.server.token_ttl_hours);

    ensure_admin_user(&conn, &auth_service);

    let db = Arc::new(Mutex::new(conn));

    let catalog = match build_catalog(&config, &db) {
        Ok(catalog) => {
            tracing::info!("Catalog provider '{}' initialized", catalog.name());
            catalog
        }
        Err(e) => {
            tracing::error!("Failed to create catalog client: {}", e);
            std::process::exit(1);
        }
    };

    let addr = config.server_addr();

    let state = AppState {
        config: Arc::new(config),
        db,
        auth_service: Arc::new(auth_service),
        catalog,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let app = build_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Cadence backend listening on {}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
