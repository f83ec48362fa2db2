use std::net::SocketAddr;

use nameflare::{app, initialize_state, telemetry};
use opentelemetry::global;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

fn init_tracing() {
    let endpoint = std::env::var(OTLP_ENDPOINT).ok();

    let otel = endpoint.as_deref().and_then(|endpoint| {
        match telemetry::setup_tracer(endpoint) {
            Ok(provider) => {
                global::set_tracer_provider(provider);
            },
            Err(err) => eprintln!("cannot create OTLP tracer: {err}"),
        }

        match telemetry::setup_logging(endpoint) {
            Ok(bridge) => Some(bridge),
            Err(err) => {
                eprintln!("cannot create OTLP log exporter: {err}");
                None
            },
        }
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer().with_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            ),
        )
        .with(otel)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "cannot listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(err) => tracing::error!(error = %err, "cannot listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() {
    init_tracing();

    let state = match initialize_state().await {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(error = %err, "cannot start server");
            std::process::exit(1);
        },
    };

    let address = state.config.address.clone();
    let listener = match TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%address, error = %err, "cannot bind address");
            std::process::exit(1);
        },
    };

    tracing::info!(%address, version = state.config.version(), "server started");

    if let Err(err) = axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        tracing::error!(error = %err, "server stopped unexpectedly");
        std::process::exit(1);
    }
}
