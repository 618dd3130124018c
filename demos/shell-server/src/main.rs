//! Remote shell server with a loopback backend.
//!
//! Run with: cargo run -p shell-server
//!
//! Clients speak the JSON request protocol on ws://127.0.0.1:3000/ws. Set
//! `REMOTE_SHELL_CONFIG` to a TOML file to change the address or provider
//! tunables.

mod config;
mod loopback;

use std::sync::Arc;

use remote_shell_session::{ChannelBackend, ShellProvider};
use remote_shell_transport::websocket::create_ws_router;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .init();

    let (backend, requests) = ChannelBackend::new();
    let provider = Arc::new(ShellProvider::new(backend, config.provider.clone()));
    tokio::spawn(loopback::run(Arc::clone(&provider), requests));

    let app = create_ws_router(provider).layer(CorsLayer::permissive());

    tracing::info!("Server listening on ws://{}/ws", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
