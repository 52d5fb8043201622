pub mod adapters;
mod app;
mod auth;
pub mod config;
pub mod ports;
pub mod push;
mod state;
pub mod store;
pub mod types;

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

pub use auth::{AuthError, generate_api_token};
pub use push::vapid::{VapidCredentials, VapidError, generate_vapid_credentials};

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to open subscription store: {0}")]
    Store(#[from] ports::StoreError),
    #[error("failed to build relay client: {0}")]
    Relay(#[from] reqwest::Error),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn serve(config: config::AppConfig) -> Result<(), ServeError> {
    let store = Arc::new(store::SqliteStore::open(&config.database)?);
    let engine = push::build_engine(&config, store)?;
    let addr = config.listen;
    let auth = auth::ApiAuth::from_config(&config);
    if auth.is_none() {
        warn!("no API token configured; subscription and notify routes will reject every request");
    }
    let state = state::AppState {
        engine: Arc::new(engine),
        auth,
    };

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServeError::Bind { addr, source })?;
    info!(%addr, "listening");
    axum::serve(listener, app::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
