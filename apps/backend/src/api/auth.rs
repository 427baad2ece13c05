//! Authentication API endpoints.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::models::{UserInfo, UserRole};
use crate::db::queries;
use crate::error::{AppError, Result};
use crate::AppState;

/// Dummy hash for timing attack prevention.
/// This is a valid Argon2 hash that will always fail verification.
const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$dGltaW5nYXR0YWNr$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Register request body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub role: Option<UserRole>,
}

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Response carrying a JWT token.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserInfo,
}

/// Generic success response.
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Reject passwords shorter than [`MIN_PASSWORD_LEN`].
pub(crate) fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Minimal shape check: something on both sides of a single `@`.
pub(crate) fn validate_email(email: &str) -> Result<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    };
    if !valid {
        return Err(AppError::BadRequest("Invalid email address".to_string()));
    }
    Ok(())
}

/// POST /api/auth/register
///
/// Creates an account and returns a JWT token for it.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let username = body.username.trim();
    let email = body.email.trim();

    if username.is_empty() || email.is_empty() || body.password.is_empty() {
        return Err(AppError::BadRequest(
            "Username, email and password are required".to_string(),
        ));
    }
    validate_email(email)?;
    validate_password(&body.password)?;

    let role = body.role.unwrap_or(UserRole::User);
    if role == UserRole::Admin {
        return Err(AppError::Forbidden);
    }

    let auth_service = state.auth_service();
    let password_hash = auth_service.hash_password(&body.password)?;

    let db = state.db.lock().await;

    if queries::email_taken(&db, email, None)? {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let user_id = queries::insert_user(&db, username, email, &password_hash, role)?;
    let user = queries::find_user_by_id(&db, user_id)?
        .ok_or_else(|| AppError::Internal("Registered user vanished".to_string()))?;

    let token = auth_service.create_token(user.id, user.role)?;

    tracing::info!(user_id = user.id, username = %user.username, role = %user.role, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: user.into(),
        }),
    ))
}

/// POST /api/auth/login
///
/// Authenticates a user by email and returns a JWT token.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(AppError::BadRequest(
            "Email and password are required".to_string(),
        ));
    }

    let db = state.db.lock().await;
    let auth_service = state.auth_service();

    let Some(user) = queries::find_user_by_email(&db, body.email.trim())? else {
        // Perform dummy verification to prevent timing attack
        let _ = auth_service.verify_password(&body.password, DUMMY_HASH);
        return Err(AppError::Unauthorized);
    };

    if !auth_service.verify_password(&body.password, &user.password_hash)? {
        tracing::debug!(user_id = user.id, "Login rejected: wrong password");
        return Err(AppError::Unauthorized);
    }

    let token = auth_service.create_token(user.id, user.role)?;

    tracing::info!(user_id = user.id, username = %user.username, "User logged in");

    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ana@example.com").is_ok());
        assert!(validate_email("ana.example.com").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("ana@").is_err());
        assert!(validate_email("a@b@c").is_err());
    }

    #[test]
    fn test_validate_password_counts_characters() {
        assert!(validate_password("12345678").is_ok());
        assert!(validate_password("1234567").is_err());
        // Eight characters, more than eight bytes
        assert!(validate_password("ñññññññññ").is_ok());
    }
}
