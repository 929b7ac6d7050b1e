//! BuzzControl Back binary entrypoint wiring the realtime coordination core.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use buzzcontrol_back::{
    clock::SystemClock,
    config::AppConfig,
    dao::catalog::{FileCatalog, JsonlResultWriter},
    routes, services,
    state::{AppState, SharedState},
};

/// Filter applied when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";
/// Port used when neither `PORT` nor `SERVER_PORT` is set.
const DEFAULT_PORT: u16 = 8080;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();

    // A malformed catalog is the only fatal error besides a failed bind.
    let catalog = FileCatalog::load(&config.data_dir).context("loading catalog")?;
    let results = JsonlResultWriter::new(config.results_path.clone());

    let app_state = AppState::new(
        config,
        catalog.clone(),
        catalog,
        results,
        Arc::new(SystemClock),
    );

    tokio::spawn(services::heartbeat::run(app_state.clone()));

    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port_from_env()));
    let listener = TcpListener::bind(addr).await.context("binding server")?;
    info!(address = %addr, "listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Pick the listen port from the environment, preferring `PORT`.
fn port_from_env() -> u16 {
    ["PORT", "SERVER_PORT"]
        .iter()
        .find_map(|key| env::var(key).ok()?.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

/// Stack the cross-cutting middleware on top of the API routes.
fn build_router(state: SharedState) -> Router<()> {
    let api = routes::router(state);
    api.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Install the global tracing subscriber; `RUST_LOG` overrides the default
/// filter.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolve once the process is asked to stop: Ctrl+C everywhere, SIGTERM
/// on unix as well.
async fn shutdown_signal() {
    let interrupt = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate =
            signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = interrupt => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = interrupt.await;
    }
}
