//! Deactivate the authenticated account.

use axum::Extension;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::router::OptionalValid;
use crate::user::User;
use crate::{AppState, ServerError};

#[derive(Debug, Default, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct Body {
    #[validate(length(max = 255, message = "Reason must be at most 255 characters long."))]
    pub reason: Option<String>,
}

pub async fn handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    OptionalValid(body): OptionalValid<Body>,
) -> Result<StatusCode, ServerError> {
    state
        .users
        .deactivate(&user, body.reason.as_deref(), user.id)
        .await?;

    tracing::info!(user_id = user.id, "user deactivated");
    Ok(StatusCode::NO_CONTENT)
}
