//! User administration endpoints (admin only).

use axum::{
    extract::{Path, State},
    middleware as axum_mw,
    routing::{delete, get},
    Extension, Json, Router,
};

use crate::api::auth::SuccessResponse;
use crate::db::{models::UserInfo, queries};
use crate::error::{AppError, Result};
use crate::middleware::{auth_middleware, require_admin};
use crate::services::Claims;
use crate::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id", delete(delete_user))
        .route_layer(axum_mw::from_fn(require_admin))
        .route_layer(axum_mw::from_fn_with_state(state, auth_middleware))
}

/// GET /api/admin/users
///
/// Lists all users.
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserInfo>>> {
    let db = state.db.lock().await;

    let users = queries::list_users(&db)?
        .into_iter()
        .map(UserInfo::from)
        .collect();

    Ok(Json(users))
}

/// DELETE /api/admin/users/:id
///
/// Deletes a user and everything they own. Admins cannot delete themselves.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<i64>,
) -> Result<Json<SuccessResponse>> {
    if user_id == claims.sub {
        return Err(AppError::BadRequest(
            "Cannot delete your own account from the admin API".to_string(),
        ));
    }

    let db = state.db.lock().await;

    if !queries::delete_user(&db, user_id)? {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    tracing::info!(user_id = user_id, deleted_by = claims.sub, "User deleted");

    Ok(Json(SuccessResponse {
        message: "User deleted successfully".to_string(),
    }))
}
