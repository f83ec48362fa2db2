//! Sign in with email and password.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, header};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::config::{Identity, Scheme};
use crate::router::{ClientIp, Valid};
use crate::{AppState, ServerError};

const TOKEN_TYPE: &str = "Bearer";

#[derive(Validate, Serialize, Deserialize)]
pub struct Body {
    #[validate(email(message = "Email is invalid."))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub token_type: String,
    pub token: String,
    pub expires_in: u64,
}

/// `Set-Cookie` value carrying the session token.
fn session_cookie(identity: &Identity, token: &str, max_age: u64) -> String {
    let mut cookie = format!(
        "{}={token}; Max-Age={max_age}; Path=/; HttpOnly; SameSite=Lax",
        identity.cookie_name
    );
    if identity.secure_cookie {
        cookie.push_str("; Secure");
    }
    cookie
}

pub async fn handler(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Valid(body): Valid<Body>,
) -> Result<(HeaderMap, Json<Response>), ServerError> {
    let ip = ip.map(|ip| ip.to_string());
    let user = state
        .users
        .authenticate(&body.email, &body.password, ip.as_deref())
        .await?;

    let token = state.token.create(&user.id.to_string())?;
    let expires_in = state.token.expires_in();

    let mut headers = HeaderMap::new();
    let identity = &state.config.identity;
    if identity.scheme == Scheme::Cookie {
        let cookie = session_cookie(identity, &token, expires_in);
        let value = HeaderValue::from_str(&cookie).map_err(|err| ServerError::Internal {
            details: "session cookie cannot be encoded".into(),
            source: Some(Box::new(err)),
        })?;
        headers.insert(header::SET_COOKIE, value);
    }

    tracing::info!(user_id = user.id, "user signed in");

    Ok((
        headers,
        Json(Response {
            token_type: TOKEN_TYPE.to_owned(),
            token,
            expires_in,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;

    use super::*;
    use crate::*;

    async fn register(app: axum::Router) {
        let body = json!({
            "name": "Ana Silva",
            "email": "ana@nameflare.dev",
            "password": "Str0ng-Passw0rd",
            "confirm_password": "Str0ng-Passw0rd",
            "terms_accepted": true,
        });
        let response = make_request(None, app, Method::POST, "/users", body.to_string()).await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    fn login_body(password: &str) -> String {
        json!(Body {
            email: "ANA@nameflare.dev".into(),
            password: password.into(),
        })
        .to_string()
    }

    #[test]
    fn test_session_cookie() {
        let mut identity = Identity::default();
        assert_eq!(
            session_cookie(&identity, "abc", 60),
            "nameflare_session=abc; Max-Age=60; Path=/; HttpOnly; SameSite=Lax"
        );

        identity.secure_cookie = true;
        assert!(session_cookie(&identity, "abc", 60).ends_with("; Secure"));
    }

    #[tokio::test]
    async fn test_login_handler() {
        let (state, repo) = test_state();
        let app = app(state.clone());
        register(app.clone()).await;

        let response =
            make_request(None, app, Method::POST, "/login", login_body("Str0ng-Passw0rd")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Response = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.token_type, "Bearer");
        assert_eq!(body.expires_in, state.token.expires_in());
        assert_eq!(state.token.decode(&body.token).unwrap().sub, "1");
        assert_eq!(repo.all()[0].total_logins, 1);
    }

    #[tokio::test]
    async fn test_login_handler_sets_cookie() {
        let (mut state, _) = test_state();
        let mut config = (*state.config).clone();
        config.identity.scheme = Scheme::Cookie;
        state.config = std::sync::Arc::new(config);

        let app = app(state);
        register(app.clone()).await;

        let response =
            make_request(None, app, Method::POST, "/login", login_body("Str0ng-Passw0rd")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .unwrap();
        assert!(cookie.starts_with("nameflare_session="));
        assert!(cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn test_login_handler_wrong_password() {
        let (state, repo) = test_state();
        let app = app(state);
        register(app.clone()).await;

        let response = make_request(None, app, Method::POST, "/login", login_body("nope")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(repo.all()[0].total_logins, 0);
    }

    #[tokio::test]
    async fn test_login_handler_unconfirmed_account() {
        let (mut state, _) = test_state();
        let mut config = (*state.config).clone();
        config.identity.require_confirmed_account = true;
        state.users.require_confirmed_account = true;
        state.config = std::sync::Arc::new(config);

        let app = app(state);
        register(app.clone()).await;

        let response =
            make_request(None, app, Method::POST, "/login", login_body("Str0ng-Passw0rd")).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_login_handler_invalid_form() {
        let (state, _) = test_state();
        let app = app(state);

        let body = json!({ "email": "not-an-email", "password": "" }).to_string();
        let response = make_request(None, app, Method::POST, "/login", body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
