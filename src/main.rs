use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use taswira::{
    config::AppConfig,
    routes,
    services::{
        auth_service::ForgejoAuthenticator, image_store::ImageStore,
        ingest_service::IngestService,
    },
    state::AppState,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;
    tracing::info!("Starting taswira with config: {:?}", cfg);

    // --- Open storage root ---
    let store = ImageStore::open(&cfg.img_root)
        .await
        .with_context(|| format!("opening image root {}", cfg.img_root.display()))?;
    tracing::info!("Serving images from {}", store.root().display());

    // --- Initialize services ---
    let authenticator =
        ForgejoAuthenticator::new(cfg.instance.clone()).context("building auth client")?;
    let addr = cfg.addr();
    let state = AppState::new(cfg, IngestService::new(store), Arc::new(authenticator));

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shut down");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::warn!("failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
