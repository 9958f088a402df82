//! # Storefront Checkout API
//!
//! HTTP server for carts, checkout, payments and returns.
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  EngineConfig::load (defaults ► checkout.toml ► CHECKOUT_*)             │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  tracing (RUST_LOG or logging.level)                                   │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  Database::new (migrations) ──► Engine::build ──► axum::serve           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use checkout_api::{router, AppState, CartStore};
use checkout_db::{Database, DbConfig};
use checkout_engine::{Engine, EngineConfig, LogNotifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional first argument: path to checkout.toml
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = EngineConfig::load(config_path).context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("Starting storefront checkout API...");

    let db_config = DbConfig::new(&config.database.path).max_connections(config.database.max_connections);
    let db = Database::new(db_config)
        .await
        .context("Failed to open database")?;
    info!(path = ?config.database.path, "Database ready");

    let engine = Engine::build(&config, db.clone(), Arc::new(LogNotifier))?;
    let state = AppState::new(engine, db.clone()).with_carts(CartStore::from_settings(&config.server));

    let addr = config.server.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!(%addr, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
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

    info!("Shutdown signal received, starting graceful shutdown...");
}
