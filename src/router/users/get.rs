//! Get user data.

use axum::extract::{Path, State};
use axum::{Extension, Json};

use crate::user::User;
use crate::{AppState, ServerError};

/// Authenticated user.
pub async fn me(Extension(user): Extension<User>) -> Json<User> {
    Json(user)
}

/// Any active user.
pub async fn handler(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<User>, ServerError> {
    Ok(Json(state.users.find_by_id(user_id).await?))
}
