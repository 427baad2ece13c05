//! Authentication service for Cadence.
//!
//! Provides password hashing with Argon2 and JWT token management.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::db::models::UserRole;
use crate::error::{AppError, Result};

/// JWT claims for authentication tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: i64,
    pub role: UserRole,
    /// Expiration timestamp (Unix time)
    pub exp: usize,
    /// Issued at timestamp (Unix time)
    pub iat: usize,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Default token lifetime in hours (7 days).
pub const DEFAULT_TOKEN_TTL_HOURS: u64 = 7 * 24;

/// Authentication service handling password hashing and JWT tokens.
pub struct AuthService {
    jwt_secret: String,
    token_ttl_secs: usize,
    argon2: Argon2<'static>,
}

impl AuthService {
    /// Creates a new AuthService with the given JWT secret and the default token lifetime.
    pub fn new(jwt_secret: String) -> Self {
        Self::with_ttl(jwt_secret, DEFAULT_TOKEN_TTL_HOURS)
    }

    /// Creates a new AuthService issuing tokens valid for `ttl_hours`.
    pub fn with_ttl(jwt_secret: String, ttl_hours: u64) -> Self {
        Self {
            jwt_secret,
            token_ttl_secs: (ttl_hours.saturating_mul(3600)).min(usize::MAX as u64) as usize,
            argon2: Argon2::default(),
        }
    }

    /// Hashes a password using Argon2.
    ///
    /// Returns the PHC-formatted hash string.
    pub fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;
        Ok(hash.to_string())
    }

    /// Verifies a password against a stored hash.
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(format!("Invalid password hash format: {}", e)))?;

        Ok(self
            .argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Creates a JWT token for the given user.
    pub fn create_token(&self, user_id: i64, role: UserRole) -> Result<String> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| AppError::Internal(format!("System time error: {}", e)))?
            .as_secs() as usize;

        let claims = Claims {
            sub: user_id,
            role,
            exp: now.saturating_add(self.token_ttl_secs),
            iat: now,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token creation failed: {}", e)))
    }

    /// Verifies a JWT token and returns the claims.
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| {
            tracing::debug!("Token verification failed: {}", e);
            AppError::Unauthorized
        })?;

        Ok(token_data.claims)
    }
}
