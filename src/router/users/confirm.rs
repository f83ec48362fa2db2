//! Confirm the email address of an account.

use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::router::Valid;
use crate::user::User;
use crate::{AppState, ServerError};

#[derive(Debug, Default, Validate, Serialize, Deserialize)]
pub struct Body {
    #[serde(default)]
    #[validate(length(min = 1, message = "Token is required."))]
    pub token: String,
}

/// `POST /users/confirm` with `{"token": "..."}`.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<User>, ServerError> {
    Ok(Json(state.users.confirm_email(&body.token).await?))
}

/// `GET /users/confirm?token=...`, the link sent by email.
pub async fn link(
    State(state): State<AppState>,
    Query(body): Query<Body>,
) -> Result<Json<User>, ServerError> {
    body.validate()?;
    Ok(Json(state.users.confirm_email(&body.token).await?))
}
