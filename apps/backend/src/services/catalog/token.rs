//! Client-credentials token cache with credential rotation.
//!
//! Access tokens are persisted in the `catalog_tokens` table keyed by client id,
//! so restarts reuse still-valid tokens. Up to four credential pairs are rotated
//! round-robin; a failing pair is skipped and each pair is tried at most once
//! per refresh.

use async_trait::async_trait;
use reqwest::Client;
use rusqlite::Connection;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::REQUEST_TIMEOUT_SECS;
use crate::config::ClientCredential;
use crate::db::{models::CatalogToken, queries};
use crate::error::{AppError, Result};

/// Tokens this close to expiry are treated as expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// A freshly issued access token.
#[derive(Debug, Clone, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    /// Lifetime in seconds
    pub expires_in: u64,
}

/// Exchanges client credentials for an access token.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn request_token(&self, credential: &ClientCredential) -> Result<IssuedToken>;
}

/// Persistence for cached tokens.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self, client_id: &str) -> Result<Option<CatalogToken>>;
    async fn save(&self, token: &CatalogToken) -> Result<()>;
    async fn remove(&self, client_id: &str) -> Result<()>;
}

// =============================================================================
// SQLite store
// =============================================================================

/// Token store backed by the application database.
pub struct SqliteTokenStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteTokenStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn load(&self, client_id: &str) -> Result<Option<CatalogToken>> {
        let db = self.db.lock().await;
        Ok(queries::find_token(&db, client_id)?)
    }

    async fn save(&self, token: &CatalogToken) -> Result<()> {
        let db = self.db.lock().await;
        queries::replace_token(&db, token)?;
        Ok(())
    }

    async fn remove(&self, client_id: &str) -> Result<()> {
        let db = self.db.lock().await;
        queries::delete_token(&db, client_id)?;
        Ok(())
    }
}

// =============================================================================
// OAuth2 endpoint
// =============================================================================

/// OAuth2 client-credentials token endpoint (e.g. Spotify accounts service).
pub struct OAuthTokenEndpoint {
    client: Client,
    token_url: String,
}

impl OAuthTokenEndpoint {
    pub fn new(token_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            token_url: token_url.into(),
        })
    }
}

#[async_trait]
impl TokenEndpoint for OAuthTokenEndpoint {
    async fn request_token(&self, credential: &ClientCredential) -> Result<IssuedToken> {
        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&credential.client_id, Some(&credential.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("Token endpoint ({})", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::ServiceUnavailable(format!(
                "Token endpoint returned {}",
                status
            )));
        }

        let token = response.json::<IssuedToken>().await.map_err(|e| {
            AppError::Internal(format!("Failed to parse token response: {}", e))
        })?;

        if token.access_token.is_empty() {
            return Err(AppError::ServiceUnavailable(
                "Token endpoint returned an empty access token".to_string(),
            ));
        }

        Ok(token)
    }
}

// =============================================================================
// Token manager
// =============================================================================

/// Hands out valid access tokens, refreshing and rotating credentials as needed.
pub struct TokenManager {
    credentials: Vec<ClientCredential>,
    store: Arc<dyn TokenStore>,
    endpoint: Arc<dyn TokenEndpoint>,
    /// Index of the credential to try next. Held for the whole
    /// check-then-refresh so concurrent callers wait for one refresh.
    cursor: Mutex<usize>,
}

impl TokenManager {
    pub fn new(
        credentials: Vec<ClientCredential>,
        store: Arc<dyn TokenStore>,
        endpoint: Arc<dyn TokenEndpoint>,
    ) -> Self {
        Self {
            credentials,
            store,
            endpoint,
            cursor: Mutex::new(0),
        }
    }

    /// Number of configured credential pairs.
    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }

    /// Return a valid access token, fetching a new one if none is cached.
    pub async fn access_token(&self) -> Result<String> {
        let count = self.credentials.len();
        if count == 0 {
            return Err(AppError::ServiceUnavailable(
                "Catalog authentication (no client credentials configured)".to_string(),
            ));
        }

        let mut cursor = self.cursor.lock().await;
        let now = chrono::Utc::now().timestamp();

        for step in 0..count {
            let credential = &self.credentials[(*cursor + step) % count];
            if let Some(token) = self.store.load(&credential.client_id).await? {
                if token.expires_at - EXPIRY_MARGIN_SECS > now {
                    return Ok(token.access_token);
                }
            }
        }

        for _ in 0..count {
            let index = *cursor;
            let credential = &self.credentials[index];
            *cursor = (index + 1) % count;

            match self.endpoint.request_token(credential).await {
                Ok(issued) => {
                    let token = CatalogToken {
                        client_id: credential.client_id.clone(),
                        access_token: issued.access_token,
                        expires_at: now + issued.expires_in.min(i64::MAX as u64) as i64,
                    };
                    self.store.save(&token).await?;
                    tracing::info!(
                        client_id = %credential.client_id,
                        expires_in = issued.expires_in,
                        "Obtained catalog access token"
                    );
                    return Ok(token.access_token);
                }
                Err(e) => {
                    tracing::warn!(
                        client_id = %credential.client_id,
                        error = %e,
                        "Token request failed, rotating to next credential"
                    );
                }
            }
        }

        tracing::error!(credentials = count, "All catalog credentials failed");
        Err(AppError::ServiceUnavailable(
            "Catalog authentication".to_string(),
        ))
    }

    /// Drop a cached token the API rejected so the next call refreshes it.
    pub async fn invalidate(&self, access_token: &str) -> Result<()> {
        let _cursor = self.cursor.lock().await;
        for credential in &self.credentials {
            if let Some(token) = self.store.load(&credential.client_id).await? {
                if token.access_token == access_token {
                    tracing::debug!(client_id = %credential.client_id, "Invalidating rejected token");
                    self.store.remove(&credential.client_id).await?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db_memory;
    use futures::future::join_all;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeEndpoint {
        calls: AtomicUsize,
        failing: HashSet<String>,
        expires_in: u64,
    }

    impl FakeEndpoint {
        fn new(failing: &[&str]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failing: failing.iter().map(|s| s.to_string()).collect(),
                expires_in: 3600,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenEndpoint for FakeEndpoint {
        async fn request_token(&self, credential: &ClientCredential) -> Result<IssuedToken> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            // Yield so concurrent callers really overlap with the refresh
            tokio::time::sleep(Duration::from_millis(10)).await;

            if self.failing.contains(&credential.client_id) {
                return Err(AppError::ServiceUnavailable("invalid_client".to_string()));
            }
            Ok(IssuedToken {
                access_token: format!("{}-token-{}", credential.client_id, n),
                expires_in: self.expires_in,
            })
        }
    }

    fn creds(ids: &[&str]) -> Vec<ClientCredential> {
        ids.iter()
            .map(|id| ClientCredential {
                client_id: id.to_string(),
                client_secret: format!("{}-secret", id),
            })
            .collect()
    }

    fn sqlite_store() -> (Arc<Mutex<Connection>>, Arc<SqliteTokenStore>) {
        let db = Arc::new(Mutex::new(init_db_memory().unwrap()));
        let store = Arc::new(SqliteTokenStore::new(Arc::clone(&db)));
        (db, store)
    }

    #[tokio::test]
    async fn test_cached_token_is_reused() {
        let (_db, store) = sqlite_store();
        let endpoint = Arc::new(FakeEndpoint::new(&[]));
        let manager = TokenManager::new(creds(&["a"]), store, endpoint.clone());

        let first = manager.access_token().await.unwrap();
        let second = manager.access_token().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_burst_refreshes_once() {
        let (_db, store) = sqlite_store();
        let endpoint = Arc::new(FakeEndpoint::new(&[]));
        let manager = Arc::new(TokenManager::new(
            creds(&["a", "b", "c"]),
            store,
            endpoint.clone(),
        ));

        let tokens = join_all((0..10).map(|_| {
            let manager = Arc::clone(&manager);
            async move { manager.access_token().await }
        }))
        .await;

        let distinct: HashSet<String> = tokens.into_iter().map(|t| t.unwrap()).collect();
        assert_eq!(endpoint.calls(), 1);
        assert_eq!(distinct.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_token_triggers_single_refresh() {
        let (db, store) = sqlite_store();
        {
            let conn = db.lock().await;
            queries::replace_token(
                &conn,
                &CatalogToken {
                    client_id: "a".to_string(),
                    access_token: "stale".to_string(),
                    expires_at: chrono::Utc::now().timestamp() - 10,
                },
            )
            .unwrap();
        }

        let endpoint = Arc::new(FakeEndpoint::new(&[]));
        let manager = Arc::new(TokenManager::new(creds(&["a"]), store, endpoint.clone()));

        let tokens = join_all((0..5).map(|_| {
            let manager = Arc::clone(&manager);
            async move { manager.access_token().await.unwrap() }
        }))
        .await;

        assert!(tokens.iter().all(|t| t != "stale"));
        assert_eq!(endpoint.calls(), 1);

        let conn = db.lock().await;
        let stored = queries::find_token(&conn, "a").unwrap().unwrap();
        assert_eq!(stored.access_token, tokens[0]);
    }

    #[tokio::test]
    async fn test_token_near_expiry_is_not_reused() {
        let (db, store) = sqlite_store();
        {
            let conn = db.lock().await;
            queries::replace_token(
                &conn,
                &CatalogToken {
                    client_id: "a".to_string(),
                    access_token: "about-to-expire".to_string(),
                    expires_at: chrono::Utc::now().timestamp() + 5,
                },
            )
            .unwrap();
        }

        let endpoint = Arc::new(FakeEndpoint::new(&[]));
        let manager = TokenManager::new(creds(&["a"]), store, endpoint.clone());

        assert_ne!(manager.access_token().await.unwrap(), "about-to-expire");
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_credential_is_rotated_past() {
        let (_db, store) = sqlite_store();
        let endpoint = Arc::new(FakeEndpoint::new(&["a"]));
        let manager = TokenManager::new(creds(&["a", "b"]), store, endpoint.clone());

        let token = manager.access_token().await.unwrap();

        assert!(token.starts_with("b-token"));
        assert_eq!(endpoint.calls(), 2);
    }

    #[tokio::test]
    async fn test_all_credentials_failing_gives_up_after_one_pass() {
        let (_db, store) = sqlite_store();
        let endpoint = Arc::new(FakeEndpoint::new(&["a", "b", "c", "d"]));
        let manager = TokenManager::new(creds(&["a", "b", "c", "d"]), store, endpoint.clone());

        let result = manager.access_token().await;

        assert!(matches!(result, Err(AppError::ServiceUnavailable(_))));
        assert_eq!(endpoint.calls(), 4);
    }

    #[tokio::test]
    async fn test_no_credentials_is_service_unavailable() {
        let (_db, store) = sqlite_store();
        let endpoint = Arc::new(FakeEndpoint::new(&[]));
        let manager = TokenManager::new(Vec::new(), store, endpoint.clone());

        assert!(matches!(
            manager.access_token().await,
            Err(AppError::ServiceUnavailable(_))
        ));
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let (_db, store) = sqlite_store();
        let endpoint = Arc::new(FakeEndpoint::new(&[]));
        let manager = TokenManager::new(creds(&["a"]), store, endpoint.clone());

        let first = manager.access_token().await.unwrap();
        manager.invalidate(&first).await.unwrap();
        let second = manager.access_token().await.unwrap();

        assert_ne!(first, second);
        assert_eq!(endpoint.calls(), 2);
    }
}
