//! Users-related HTTP API.
mod confirm;
mod delete;
mod get;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Router, middleware};

use crate::config::{Identity, Scheme};
use crate::{AppState, ServerError};

const BEARER: &str = "Bearer ";

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn cookie_token<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|token| !token.is_empty())
}

/// Session token sent by the client.
///
/// The cookie scheme still accepts an `Authorization` header.
fn session_token<'a>(headers: &'a HeaderMap, identity: &Identity) -> Option<&'a str> {
    match identity.scheme {
        Scheme::Bearer => bearer_token(headers),
        Scheme::Cookie => {
            cookie_token(headers, &identity.cookie_name).or_else(|| bearer_token(headers))
        },
    }
}

/// Custom middleware for authentification.
async fn auth(
    State(state): State<AppState>,
    mut req: Request,
    next: middleware::Next,
) -> Result<Response, ServerError> {
    let Some(token) = session_token(req.headers(), &state.config.identity) else {
        return Err(ServerError::Unauthorized);
    };

    let claims = state.token.decode(token).map_err(|err| {
        tracing::debug!(error = %err, "session token rejected");
        ServerError::Unauthorized
    })?;
    let user_id = claims
        .sub
        .parse::<i64>()
        .map_err(|_| ServerError::Unauthorized)?;

    let user = match state.users.find_by_id(user_id).await {
        Ok(user) => user,
        Err(ServerError::NotFound) => return Err(ServerError::Unauthorized),
        Err(err) => return Err(err),
    };

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `GET /users/@me` goes to `me`. Authorization required.
        .route("/@me", get(get::me).delete(delete::handler))
        // `GET /users/:ID` goes to `get`. Authorization required.
        .route("/{user_id}", get(get::handler))
        .route_layer(middleware::from_fn_with_state(state, auth))
        // `POST /users` goes to `create`.
        .route("/", post(crate::router::create::handler))
        // `POST /users/confirm` and the emailed `GET /users/confirm?token=`.
        .route("/confirm", get(confirm::link).post(confirm::handler))
}
