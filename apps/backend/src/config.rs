//! Configuration module for the Cadence backend.
//!
//! Loads configuration from `config.toml` with environment variable overrides.

use config::{Config as ConfigLoader, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::AppError;

/// Maximum number of client-credential pairs read from `CLIENT_ID_n` / `CLIENT_SECRET_n`.
pub const MAX_CREDENTIAL_PAIRS: usize = 4;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Server configuration
#[derive(Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub jwt_secret: Option<String>,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: u64,
    #[serde(default)]
    pub environment: RuntimeEnvironment,
}

// Custom Debug implementation to avoid exposing jwt_secret
impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field(
                "jwt_secret",
                &self.jwt_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_ttl_hours", &self.token_ttl_hours)
            .field("environment", &self.environment)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            jwt_secret: None,
            token_ttl_hours: default_token_ttl_hours(),
            environment: RuntimeEnvironment::default(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_token_ttl_hours() -> u64 {
    7 * 24
}

/// Deployment mode. Outside production, internal error details are returned to clients.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Production,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/cadence.db")
}

/// Which external catalog backs the music endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CatalogProviderKind {
    #[default]
    Deezer,
    Spotify,
}

impl std::fmt::Display for CatalogProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogProviderKind::Deezer => write!(f, "deezer"),
            CatalogProviderKind::Spotify => write!(f, "spotify"),
        }
    }
}

/// External catalog configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CatalogConfig {
    #[serde(default)]
    pub provider: CatalogProviderKind,
    #[serde(default)]
    pub deezer: DeezerConfig,
    #[serde(default)]
    pub spotify: SpotifyConfig,
}

/// Deezer API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DeezerConfig {
    #[serde(default = "default_deezer_base_url")]
    pub base_url: String,
}

impl Default for DeezerConfig {
    fn default() -> Self {
        Self {
            base_url: default_deezer_base_url(),
        }
    }
}

fn default_deezer_base_url() -> String {
    "https://api.deezer.com".to_string()
}

/// Spotify API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyConfig {
    #[serde(default = "default_spotify_api_url")]
    pub api_url: String,
    #[serde(default = "default_spotify_token_url")]
    pub token_url: String,
    #[serde(default = "default_spotify_market")]
    pub market: String,
    #[serde(default)]
    pub credentials: Vec<ClientCredential>,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            api_url: default_spotify_api_url(),
            token_url: default_spotify_token_url(),
            market: default_spotify_market(),
            credentials: Vec::new(),
        }
    }
}

fn default_spotify_api_url() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_spotify_token_url() -> String {
    "https://accounts.spotify.com/api/token".to_string()
}

fn default_spotify_market() -> String {
    "US".to_string()
}

/// OAuth2 client-credentials pair
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct ClientCredential {
    pub client_id: String,
    pub client_secret: String,
}

// Custom Debug implementation to avoid exposing client_secret
impl std::fmt::Debug for ClientCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredential")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `config.toml` in current directory (optional)
    /// 3. Environment variables with `CADENCE_` prefix
    /// 4. Spotify credential pairs from `CLIENT_ID_n` / `CLIENT_SECRET_n`
    ///
    /// Environment variables use double underscore for nesting:
    /// - `CADENCE_SERVER__PORT=9000` sets `server.port`
    /// - `CADENCE_CATALOG__PROVIDER=spotify` sets `catalog.provider`
    pub fn load() -> Result<Self, AppError> {
        Self::load_from("config.toml")
    }

    /// Load configuration from a specific file path.
    pub fn load_from(config_path: &str) -> Result<Self, AppError> {
        Self::load_with_env(config_path, None)
    }

    /// Load configuration, reading `CADENCE_*` and credential variables from
    /// `vars` instead of the process environment when given.
    fn load_with_env(
        config_path: &str,
        vars: Option<config::Map<String, String>>,
    ) -> Result<Self, AppError> {
        let config = ConfigLoader::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            .set_default("server.token_ttl_hours", 168)?
            .set_default("database.path", "./data/cadence.db")?
            .set_default("catalog.provider", "deezer")?
            .add_source(File::with_name(config_path).required(false))
            // CADENCE_SERVER__PORT=9000 -> server.port = 9000
            .add_source(
                Environment::with_prefix("CADENCE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(vars.clone()),
            )
            .build()?;

        let mut config: Config = config.try_deserialize()?;

        let from_env = match &vars {
            Some(vars) => credentials_from_env(|key| vars.get(key).cloned()),
            None => credentials_from_env(|key| std::env::var(key).ok()),
        };
        if !from_env.is_empty() {
            config.catalog.spotify.credentials = from_env;
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for required fields.
    fn validate(&self) -> Result<(), AppError> {
        if self.server.jwt_secret.is_none() {
            tracing::warn!("JWT secret not configured - a random secret will be generated");
        }

        if self.server.token_ttl_hours == 0 {
            return Err(AppError::Config(config::ConfigError::Message(
                "server.token_ttl_hours must be greater than zero".to_string(),
            )));
        }

        if self.catalog.provider == CatalogProviderKind::Spotify
            && self.catalog.spotify.credentials.is_empty()
        {
            tracing::warn!("Spotify selected but no client credentials configured - music lookups will fail");
        }

        Ok(())
    }

    /// Get the server socket address
    pub fn server_addr(&self) -> std::net::SocketAddr {
        use std::net::{IpAddr, Ipv4Addr, SocketAddr};
        let ip: IpAddr = self.server.host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid host '{}', using 0.0.0.0", self.server.host);
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        });
        SocketAddr::new(ip, self.server.port)
    }

    /// Whether the server runs in production mode.
    pub fn is_production(&self) -> bool {
        self.server.environment == RuntimeEnvironment::Production
    }
}

/// Collect up to four credential pairs from `CLIENT_ID_n` / `CLIENT_SECRET_n`.
///
/// Pairs with a missing or empty half are skipped.
fn credentials_from_env<F>(lookup: F) -> Vec<ClientCredential>
where
    F: Fn(&str) -> Option<String>,
{
    (1..=MAX_CREDENTIAL_PAIRS)
        .filter_map(|n| {
            let client_id = lookup(&format!("CLIENT_ID_{}", n))?;
            let client_secret = lookup(&format!("CLIENT_SECRET_{}", n))?;
            if client_id.trim().is_empty() || client_secret.trim().is_empty() {
                return None;
            }
            Some(ClientCredential {
                client_id,
                client_secret,
            })
        })
        .collect()
}
