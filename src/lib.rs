//! NameFlare is a small account service: registration, sign-in with
//! signed tokens and a name lookup demo.
#![forbid(unsafe_code)]

pub mod config;
mod crypto;
mod database;
pub mod error;
mod mail;
mod router;
pub mod telemetry;
mod token;
mod user;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use error::ServerError;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// MUST NEVER be used in production.
///
/// `auth` signs a token for the given user id.
#[cfg(test)]
pub async fn make_request(
    auth: Option<(&AppState, i64)>,
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");

    if let Some((state, user_id)) = auth {
        let token = state
            .token
            .create(&user_id.to_string())
            .expect("cannot create JWT");
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State backed by an in-memory store, with light Argon2 parameters and
/// unconfirmed accounts allowed to sign in.
#[cfg(test)]
pub fn test_state() -> (AppState, Arc<user::memory::MemoryUserRepository>) {
    test_state_with(false)
}

/// Same as [`test_state`], choosing whether sign-in needs a confirmed email.
#[cfg(test)]
pub fn test_state_with(
    require_confirmed_account: bool,
) -> (AppState, Arc<user::memory::MemoryUserRepository>) {
    let mut config = config::Configuration::default();
    config.token.secret = "test-secret".into();
    config.token.issuer = "https://issuer.nameflare.dev".into();
    config.token.audience = "https://api.nameflare.dev".into();
    config.database.connection_string = "postgres://localhost/nameflare".into();
    config.identity.require_confirmed_account = require_confirmed_account;

    let repo = Arc::new(user::memory::MemoryUserRepository::new());
    let pwd = Arc::new(
        crypto::PasswordManager::new(Some(crypto::light_config())).expect("argon2 parameters"),
    );
    let token = token::TokenManager::new(&config.token);
    let users = user::UserService::new(
        repo.clone(),
        pwd,
        Arc::new(mail::NoopEmailSender),
        token.clone(),
        &config.identity,
    );

    let state = AppState {
        config: Arc::new(config),
        users,
        token,
        metrics: None,
    };

    (state, repo)
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub users: user::UserService,
    pub token: token::TokenManager,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, REQUEST_TIMEOUT))
        // Remove sensitive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE, header::SET_COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        // `GET /metrics` goes to `metrics`.
        .route("/metrics", get(router::status::metrics))
        // `POST /login` goes to `login`.
        .route("/login", post(router::login::handler))
        // `GET /lookup/:NAME` goes to `lookup`.
        .route("/lookup/{name}", get(router::lookup::handler))
        .route("/busca/nome/{name}", get(router::lookup::handler))
        .nest("/users", router::users::router(state.clone()))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
///
/// Reads the configuration, connects to PostgreSQL and runs pending
/// migrations.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error + Send + Sync>> {
    // read configuration file. let it in memory.
    let path = std::env::var("CONFIG_PATH").map(PathBuf::from).unwrap_or_default();
    let config = config::Configuration::default().path(path).read()?;

    let db = database::Database::new(&config.database).await?;
    // execute migrations scripts on start.
    db.migrate().await?;

    let pwd = Arc::new(crypto::PasswordManager::new(config.argon2.clone())?);
    let token = token::TokenManager::new(&config.token);
    let repo = Arc::new(user::PgUserRepository::new(db.postgres.clone(), db.retry));
    let users = user::UserService::new(
        repo,
        pwd,
        Arc::new(mail::NoopEmailSender),
        token.clone(),
        &config.identity,
    );

    let metrics = match telemetry::setup_metrics_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::warn!(error = %err, "prometheus recorder not installed");
            None
        },
    };

    Ok(AppState {
        config,
        users,
        token,
        metrics,
    })
}
