//! Profile and listening-history endpoints for the authenticated user.

use axum::{
    extract::State,
    middleware as axum_mw,
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;

use crate::api::auth::{validate_email, validate_password, SuccessResponse};
use crate::db::{
    models::{UserInfo, ViewedTrack},
    queries,
};
use crate::error::{AppError, Result};
use crate::middleware::auth_middleware;
use crate::services::Claims;
use crate::AppState;

/// Update profile request body. Absent fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ViewedTrackRequest {
    pub track: ViewedTrack,
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/profile",
            get(get_profile).put(update_profile).delete(delete_profile),
        )
        .route(
            "/viewed-tracks",
            get(list_viewed_tracks).post(add_viewed_track),
        )
        .route_layer(axum_mw::from_fn_with_state(state, auth_middleware))
}

/// GET /api/user/profile
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserInfo>> {
    let db = state.db.lock().await;

    let user = queries::find_user_by_id(&db, claims.sub)?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user.into()))
}

/// PUT /api/user/profile
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<UserInfo>> {
    if body.username.is_none() && body.email.is_none() && body.password.is_none() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let username = body.username.as_deref().map(str::trim);
    if username == Some("") {
        return Err(AppError::BadRequest("Username cannot be empty".to_string()));
    }

    let email = body.email.as_deref().map(str::trim);
    if let Some(email) = email {
        validate_email(email)?;
    }

    let password_hash = match body.password.as_deref() {
        Some(password) => {
            validate_password(password)?;
            Some(state.auth_service().hash_password(password)?)
        }
        None => None,
    };

    let db = state.db.lock().await;

    if queries::find_user_by_id(&db, claims.sub)?.is_none() {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    if let Some(email) = email {
        if queries::email_taken(&db, email, Some(claims.sub))? {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }
    }

    queries::update_user(&db, claims.sub, username, email, password_hash.as_deref())?;

    let user = queries::find_user_by_id(&db, claims.sub)?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    tracing::info!(user_id = user.id, "Profile updated");

    Ok(Json(user.into()))
}

/// DELETE /api/user/profile
///
/// Deletes the account together with its playlists and history.
pub async fn delete_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<SuccessResponse>> {
    let db = state.db.lock().await;

    if !queries::delete_user(&db, claims.sub)? {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    tracing::info!(user_id = claims.sub, "Account deleted");

    Ok(Json(SuccessResponse {
        message: "Account deleted".to_string(),
    }))
}

/// GET /api/user/viewed-tracks
pub async fn list_viewed_tracks(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ViewedTrack>>> {
    let db = state.db.lock().await;
    Ok(Json(queries::viewed_tracks(&db, claims.sub)?))
}

/// POST /api/user/viewed-tracks
pub async fn add_viewed_track(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<ViewedTrackRequest>,
) -> Result<Json<Vec<ViewedTrack>>> {
    if body.track.id.trim().is_empty() || body.track.name.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Track id and name are required".to_string(),
        ));
    }

    let db = state.db.lock().await;

    if queries::find_user_by_id(&db, claims.sub)?.is_none() {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    queries::record_viewed_track(&db, claims.sub, &body.track)?;

    tracing::debug!(user_id = claims.sub, track_id = %body.track.id, "Track viewed");

    Ok(Json(queries::viewed_tracks(&db, claims.sub)?))
}
