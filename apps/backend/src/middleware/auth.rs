//! Request guards for the Cadence API.
//!
//! `auth_middleware` turns a bearer token into [`Claims`] on the request;
//! `require_admin` gates the admin routes on top of it.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};

use crate::error::{AppError, Result};
use crate::services::auth::Claims;
use crate::AppState;

/// Bearer credential from the Authorization header, if any.
///
/// The scheme is matched case-insensitively. An empty credential counts as absent.
fn bearer_token(request: &Request<Body>) -> Option<&str> {
    let value = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Validates the bearer token and stores its [`Claims`] in the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response> {
    let Some(token) = bearer_token(&request) else {
        tracing::debug!(path = %request.uri().path(), "Missing bearer token");
        return Err(AppError::Unauthorized);
    };

    let claims = state.auth_service().verify_token(token)?;
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Rejects callers whose token does not carry the admin role.
///
/// Layer this inside `auth_middleware`.
pub async fn require_admin(request: Request<Body>, next: Next) -> Result<Response> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .ok_or(AppError::Unauthorized)?;

    if !claims.is_admin() {
        tracing::debug!(user_id = claims.sub, role = %claims.role, "Admin route refused");
        return Err(AppError::Forbidden);
    }

    Ok(next.run(request).await)
}
